//! End-slate post-processing.
//!
//! Takes a finalised render folder and produces a complete sibling copy in
//! which every rendered video gets the slate image appended, text files
//! get their folder references rewritten, and everything else is copied
//! unchanged. Per-file failures never stop the batch; the job fails at the
//! end if any file could not be processed.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use tracing::{error, info, warn};

use advariant_media::{end_slate_filter, probe_dimensions, probe_video, FfmpegCommand, FfmpegRunner};
use advariant_models::naming;
use advariant_storage::{content_type_for, StorageClient};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::trigger::TriggerFile;

/// Title suffix applied to processed variants.
const TITLE_MARKER: &str = " - WITH END SLATE";

/// Substring whose presence means the title was already processed.
const TITLE_MARKER_CHECK: &str = "WITH END SLATE";

/// Description padding applied to processed variants.
const DESCRIPTION_PAD: &str = "    ";

/// Substring whose presence means the description was already padded.
const DESCRIPTION_PAD_CHECK: &str = "   ";

/// Extensions treated as text and eligible for reference rewriting.
const TEXT_EXTENSIONS: &[&str] = &[".json", ".txt", ".yaml", ".yml", ".xml", ".html"];

/// End-slate job configuration, parsed from the trigger JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct EndSlateConfig {
    /// Slate image filename within the root video folder.
    pub image: String,
    /// How long the slate is held, in seconds.
    #[serde(deserialize_with = "duration_from_number_or_string")]
    pub duration: u32,
    /// The finished render folder, URL-decoded on load.
    pub rendered_video_folder: String,
}

impl EndSlateConfig {
    pub fn parse(contents: &[u8]) -> WorkerResult<Self> {
        let mut config: EndSlateConfig = serde_json::from_slice(contents)?;
        config.rendered_video_folder = urlencoding::decode(&config.rendered_video_folder)
            .map_err(|e| WorkerError::job_failed(format!("Bad folder encoding: {e}")))?
            .into_owned();
        Ok(config)
    }
}

fn duration_from_number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u32),
        String(String),
    }
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// End-slate batch processor.
pub struct EndSlateProcessor<'a> {
    storage: &'a StorageClient,
    config: &'a WorkerConfig,
}

impl<'a> EndSlateProcessor<'a> {
    pub fn new(storage: &'a StorageClient, config: &'a WorkerConfig) -> Self {
        Self { storage, config }
    }

    fn runner(&self) -> FfmpegRunner {
        FfmpegRunner::new().with_timeout(self.config.ffmpeg_timeout.as_secs())
    }

    /// Process one finished render folder.
    pub async fn process(&self, trigger: &TriggerFile) -> WorkerResult<()> {
        info!("Starting end-slate processing");
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let tmp_dir = tempfile::tempdir_in(&self.config.work_dir)?;
        let tmp = tmp_dir.path();

        let contents = self
            .storage
            .download_bytes(&trigger.full_path)
            .await?
            .ok_or_else(|| {
                WorkerError::job_failed(format!("Missing end-slate config: {}", trigger.full_path))
            })?;
        let job = EndSlateConfig::parse(&contents)?;
        info!(?job, "End-slate config loaded");

        let root = &trigger.root_folder;
        let image_path = self
            .storage
            .download_to_dir(&format!("{root}/{}", job.image), tmp)
            .await?
            .ok_or_else(|| {
                WorkerError::job_failed(format!("Missing end-slate image: {}", job.image))
            })?;
        let (image_width, image_height) = probe_dimensions(&image_path).await?;
        info!(image_width, image_height, "End-slate image loaded");

        let render_folder = &job.rendered_video_folder;
        let cta_folder =
            derive_cta_folder(render_folder, chrono::Utc::now().timestamp_millis());
        info!(cta_folder = %cta_folder, "Creating end-slate folder");

        let files = self
            .storage
            .list(&format!("{root}/{render_folder}/"), None)
            .await?;
        info!(count = files.len(), "Files to process");

        let mut failed = 0usize;
        for object in &files {
            let result = if is_combo_video(&object.key) {
                self.process_video(
                    &object.key,
                    &image_path,
                    job.duration,
                    root,
                    render_folder,
                    &cta_folder,
                    tmp,
                )
                .await
            } else if is_text_file(&object.key) {
                self.process_text(&object.key, root, render_folder, &cta_folder)
                    .await
            } else {
                self.copy_unchanged(&object.key, root, render_folder, &cta_folder)
                    .await
            };

            if let Err(e) = result {
                error!(key = %object.key, error = %e, "File processing failed; continuing with remaining files");
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(WorkerError::job_failed(format!(
                "{failed} of {} files failed end-slate processing",
                files.len()
            )));
        }

        info!(cta_folder = %cta_folder, "End-slate processing completed successfully");
        Ok(())
    }

    /// Append the slate to one rendered video, letterboxed to that video's
    /// own resolution and held at its own frame rate.
    #[allow(clippy::too_many_arguments)]
    async fn process_video(
        &self,
        key: &str,
        image_path: &Path,
        duration: u32,
        root: &str,
        render_folder: &str,
        cta_folder: &str,
        tmp: &Path,
    ) -> WorkerResult<()> {
        let relative = relative_path(key, render_folder);
        info!(file = %relative, "Appending end slate");

        let local = self
            .storage
            .download_to_dir(key, tmp)
            .await?
            .ok_or_else(|| WorkerError::job_failed(format!("Video disappeared: {key}")))?;

        let video = probe_video(&local).await?;

        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let output = tmp.join(format!("endslate_{file_name}"));

        let cmd = FfmpegCommand::new(&output)
            .input(&local)
            .input_with_args(
                [
                    "-loop".to_string(),
                    "1".to_string(),
                    "-framerate".to_string(),
                    video.fps.to_string(),
                    "-t".to_string(),
                    duration.to_string(),
                ],
                image_path,
            )
            .filter_complex(end_slate_filter(video.width, video.height))
            .map("[outv]")
            .map("0:a?")
            .video_codec("libx264")
            .preset("fast")
            .crf(23)
            .audio_codec("copy")
            .output_args(["-movflags", "+faststart"]);
        self.runner().run(&cmd).await?;

        self.storage
            .upload_file(&output, &format!("{root}/{cta_folder}/{relative}"), false)
            .await?;
        Ok(())
    }

    /// Copy a text file with folder references rewritten; the combined
    /// result file additionally gets the end-slate markers.
    async fn process_text(
        &self,
        key: &str,
        root: &str,
        render_folder: &str,
        cta_folder: &str,
    ) -> WorkerResult<()> {
        let relative = relative_path(key, render_folder);
        info!(file = %relative, "Rewriting text file");

        let bytes = self
            .storage
            .download_bytes(key)
            .await?
            .ok_or_else(|| WorkerError::job_failed(format!("Text file disappeared: {key}")))?;
        let content = String::from_utf8_lossy(&bytes).into_owned();

        let mut updated = replace_folder_refs(&content, render_folder, cta_folder);
        if key.ends_with(naming::COMBINATIONS_FILE) {
            updated = apply_end_slate_markers(&updated);
        }

        self.storage
            .upload_bytes(
                updated.into_bytes(),
                &format!("{root}/{cta_folder}/{relative}"),
                content_type_for(Path::new(&relative)),
            )
            .await?;
        Ok(())
    }

    /// Copy an opaque file byte-for-byte.
    async fn copy_unchanged(
        &self,
        key: &str,
        root: &str,
        render_folder: &str,
        cta_folder: &str,
    ) -> WorkerResult<()> {
        let relative = relative_path(key, render_folder);
        info!(file = %relative, "Copying file unchanged");

        let bytes = self
            .storage
            .download_bytes(key)
            .await?
            .ok_or_else(|| WorkerError::job_failed(format!("File disappeared: {key}")))?;

        self.storage
            .upload_bytes(
                bytes,
                &format!("{root}/{cta_folder}/{relative}"),
                content_type_for(Path::new(&relative)),
            )
            .await?;
        Ok(())
    }
}

/// Derive the output folder name: the original minus its batch suffix,
/// plus a fresh timestamp and the fixed marker prefix.
pub fn derive_cta_folder(render_folder: &str, timestamp_millis: i64) -> String {
    let stripped = render_folder.replace("--combos", "");
    let base = stripped.split("--").next().unwrap_or_default();
    format!(
        "{}{}--{}{}",
        naming::CTA_FOLDER_PREFIX,
        base,
        timestamp_millis,
        naming::COMBOS_FOLDER_SUFFIX
    )
}

/// Whether a key names a rendered combo video.
pub fn is_combo_video(key: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"combo_\d+_[hsv]\.mp4$").expect("valid regex"))
        .is_match(key)
}

/// Whether a key names a text file eligible for reference rewriting.
pub fn is_text_file(key: &str) -> bool {
    let lower = key.to_lowercase();
    TEXT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// The path of a file relative to its containing batch folder.
pub fn relative_path(key: &str, folder_name: &str) -> String {
    match key.split_once(folder_name) {
        Some((_, rest)) => rest.trim_start_matches('/').to_string(),
        None => key.rsplit('/').next().unwrap_or(key).to_string(),
    }
}

/// Replace every reference to the original folder, in both plain and
/// URL-percent-encoded form.
pub fn replace_folder_refs(content: &str, original_folder: &str, cta_folder: &str) -> String {
    let original_encoded = urlencoding::encode(original_folder).into_owned();
    let cta_encoded = urlencoding::encode(cta_folder).into_owned();

    content
        .replace(original_folder, cta_folder)
        .replace(&original_encoded, &cta_encoded)
}

/// Apply the end-slate markers to a combined result document: title suffix
/// and description padding, each skipped when already present so repeated
/// runs never double-append. Non-JSON content passes through unchanged.
pub fn apply_end_slate_markers(content: &str) -> String {
    let mut data: serde_json::Value = match serde_json::from_str(content) {
        Ok(data) => data,
        Err(_) => {
            warn!("Combined result file is not valid JSON; leaving as-is");
            return content.to_string();
        }
    };

    if let Some(map) = data.as_object_mut() {
        for (key, variant) in map.iter_mut() {
            if !key.starts_with('_') {
                continue;
            }
            if let Some(title) = variant.get("title").and_then(|t| t.as_str()) {
                if !title.contains(TITLE_MARKER_CHECK) {
                    let updated = format!("{title}{TITLE_MARKER}");
                    variant["title"] = serde_json::Value::String(updated);
                }
            }
            if let Some(description) = variant.get("description").and_then(|d| d.as_str()) {
                if !description.contains(DESCRIPTION_PAD_CHECK) {
                    let updated = format!("{description}{DESCRIPTION_PAD}");
                    variant["description"] = serde_json::Value::String(updated);
                }
            }
        }
    }

    serde_json::to_string_pretty(&data).unwrap_or_else(|_| content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_cta_folder() {
        assert_eq!(
            derive_cta_folder("demo--1712000000-combos", 99),
            "CTA - demo--99-combos"
        );
    }

    #[test]
    fn test_is_combo_video() {
        assert!(is_combo_video("demo/1234-combos/combo_2_h.mp4"));
        assert!(is_combo_video("combo_11_v.mp4"));
        assert!(!is_combo_video("combo_2_x.mp4"));
        assert!(!is_combo_video("square.mp4"));
        assert!(!is_combo_video("combo_2_h.mov"));
    }

    #[test]
    fn test_is_text_file() {
        assert!(is_text_file("demo/combos.json"));
        assert!(is_text_file("demo/NOTES.TXT"));
        assert!(!is_text_file("demo/combo_1_h.mp4"));
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path("root/1234-combos/combo_1/assets/horizontal/1.png", "1234-combos"),
            "combo_1/assets/horizontal/1.png"
        );
        assert_eq!(relative_path("root/other/file.bin", "1234-combos"), "file.bin");
    }

    #[test]
    fn test_replace_folder_refs_handles_both_encodings() {
        let content = "url: https://host/b/1234-combos/a.mp4 enc: 1234%2Dcombos";
        // The encoded form only matches when the original folder actually
        // percent-encodes; use a folder with a space to exercise it.
        let content_spaced =
            "plain: my folder--combos enc: my%20folder--combos";
        let replaced = replace_folder_refs(content_spaced, "my folder--combos", "CTA - new--combos");
        assert!(replaced.contains("plain: CTA - new--combos"));
        assert!(replaced.contains("enc: CTA%20-%20new--combos"));

        let replaced = replace_folder_refs(content, "1234-combos", "CTA - x--combos");
        assert!(replaced.contains("https://host/b/CTA - x--combos/a.mp4"));
    }

    #[test]
    fn test_end_slate_markers_are_idempotent() {
        let content = r#"{
            "_1": {"title": "Summer Sale", "description": "Shop now"},
            "meta": {"title": "untouched"}
        }"#;

        let once = apply_end_slate_markers(content);
        let value: serde_json::Value = serde_json::from_str(&once).unwrap();
        assert_eq!(value["_1"]["title"], "Summer Sale - WITH END SLATE");
        assert_eq!(value["_1"]["description"], "Shop now    ");
        assert_eq!(value["meta"]["title"], "untouched");

        let twice = apply_end_slate_markers(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_end_slate_markers_pass_through_non_json() {
        let content = "not json at all";
        assert_eq!(apply_end_slate_markers(content), content);
    }

    #[test]
    fn test_config_accepts_string_duration() {
        let config =
            EndSlateConfig::parse(br#"{"image": "slate.png", "duration": "3", "rendered_video_folder": "demo%20x--combos"}"#)
                .unwrap();
        assert_eq!(config.duration, 3);
        assert_eq!(config.rendered_video_folder, "demo x--combos");

        let config =
            EndSlateConfig::parse(br#"{"image": "slate.png", "duration": 5, "rendered_video_folder": "demo"}"#)
                .unwrap();
        assert_eq!(config.duration, 5);
    }
}
