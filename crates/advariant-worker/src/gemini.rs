//! Generative vision-model client.
//!
//! Used for two supplementary tasks: identifying visually key timestamps
//! in a rendered variant, and generating headline/description ad copy.
//! Both are soft paths — an empty or malformed response is "no result",
//! never a render failure.

use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use advariant_models::TextAsset;

use crate::error::{WorkerError, WorkerResult};

/// Prompt for key-frame identification.
const KEY_FRAMES_PROMPT: &str = "You are an expert in performance marketing. \
Watch this video ad and identify up to 5 visually striking moments that \
would work as standalone image ads. Return one timestamp per line, in \
seconds from the start of the video (e.g. `3.5`), and nothing else.";

/// Prompt for text-asset generation; `{language}` is substituted.
const TEXT_ASSETS_PROMPT: &str = "You are an expert in performance marketing. \
Watch this video ad and write 5 ad text pairs in {language}. Separate the \
pairs with a line containing only `## `, and format each pair exactly as:\n\
Headline: <headline, max 40 characters>\n\
Description: <description, max 90 characters>";

/// Separator between generated text-asset blocks.
const TEXT_ASSETS_SEPARATOR: &str = "## ";

/// Gemini API client.
pub struct GeminiClient {
    api_key: String,
    model: String,
    client: Client,
}

/// Gemini API request.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "fileData", skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
}

#[derive(Debug, Serialize)]
struct FileData {
    #[serde(rename = "fileUri")]
    file_uri: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

/// Gemini API response.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    /// Create a new client. The request timeout bounds every call; on
    /// timeout the result is treated as absent by callers, never fatal.
    pub fn new(model: impl Into<String>, timeout: Duration) -> WorkerResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| WorkerError::config_error("GEMINI_API_KEY not set"))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WorkerError::config_error(format!("HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            model: model.into(),
            client,
        })
    }

    /// Identify visually key timestamps (seconds) in a rendered video.
    pub async fn identify_key_frames(&self, video_uri: &str) -> WorkerResult<Vec<String>> {
        let text = match self.generate(video_uri, KEY_FRAMES_PROMPT).await? {
            Some(text) => text,
            None => {
                warn!("Could not identify key frames: empty response");
                return Ok(Vec::new());
            }
        };
        Ok(parse_key_frames(&text))
    }

    /// Generate headline/description pairs for a rendered video.
    pub async fn generate_text_assets(
        &self,
        video_uri: &str,
        language: &str,
    ) -> WorkerResult<Vec<TextAsset>> {
        let prompt = TEXT_ASSETS_PROMPT.replace("{language}", language);
        let text = match self.generate(video_uri, &prompt).await? {
            Some(text) => text,
            None => {
                warn!("Could not generate text assets: empty response");
                return Ok(Vec::new());
            }
        };
        let assets = parse_text_assets(&text);
        info!("Generated {} text assets", assets.len());
        Ok(assets)
    }

    /// Call the model with a video reference and prompt. Empty candidates
    /// are `Ok(None)`, not an error.
    async fn generate(&self, video_uri: &str, prompt: &str) -> WorkerResult<Option<String>> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: None,
                        file_data: Some(FileData {
                            file_uri: video_uri.to_string(),
                            mime_type: "video/mp4".to_string(),
                        }),
                    },
                    Part {
                        text: Some(prompt.to_string()),
                        file_data: None,
                    },
                ],
            }],
            generation_config: GenerationConfig { temperature: 0.4 },
        };

        debug!("Calling {} for {}", self.model, video_uri);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| WorkerError::ai_failed(format!("Gemini API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WorkerError::ai_failed(format!(
                "Gemini API returned {status}: {error_text}"
            )));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| WorkerError::ai_failed(format!("Failed to parse Gemini response: {e}")))?;

        let text = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(text)
    }
}

/// Parse key-frame timestamps: one number per line, seconds from start.
pub fn parse_key_frames(text: &str) -> Vec<String> {
    let pattern = Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*$").expect("valid regex");
    text.lines()
        .filter_map(|line| {
            pattern
                .captures(line)
                .map(|captures| captures[1].to_string())
        })
        .collect()
}

/// Parse headline/description blocks separated by `## `.
///
/// Blocks that do not match the expected shape are skipped.
pub fn parse_text_assets(text: &str) -> Vec<TextAsset> {
    let pattern =
        Regex::new(r"Headline:\s*(.+)\s*\n\s*Description:\s*(.+)").expect("valid regex");
    text.split(TEXT_ASSETS_SEPARATOR)
        .filter_map(|block| {
            let captures = pattern.captures(block)?;
            Some(TextAsset {
                headline: captures[1].trim().to_string(),
                description: captures[2].trim().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_frames() {
        let text = "3.5\n12\nnot a timestamp\n 47.25 \n";
        assert_eq!(parse_key_frames(text), vec!["3.5", "12", "47.25"]);
    }

    #[test]
    fn test_parse_key_frames_empty_response() {
        assert!(parse_key_frames("").is_empty());
        assert!(parse_key_frames("Sorry, I cannot do that.").is_empty());
    }

    #[test]
    fn test_parse_text_assets() {
        let text = "Headline: Fresh Start\nDescription: The taste of morning.\n\
                    ## \nHeadline: Go Further\nDescription: More miles per charge.";
        let assets = parse_text_assets(text);
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].headline, "Fresh Start");
        assert_eq!(assets[1].description, "More miles per charge.");
    }

    #[test]
    fn test_parse_text_assets_skips_malformed_blocks() {
        let text = "Headline: Only a headline\n## \nHeadline: Ok\nDescription: Fine.";
        let assets = parse_text_assets(text);
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].headline, "Ok");
    }
}
