//! Rendered combination output records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::segment::Segment;
use crate::variant::{RenderSettings, VideoVariant};

/// A generated headline/description pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TextAsset {
    pub headline: String,
    pub description: String,
}

/// Per-format render output: the video filename plus any image assets.
#[derive(Debug, Clone, Default)]
pub struct FormatOutput {
    /// Rendered video filename within the batch folder.
    pub path: String,
    /// Public URLs of generated image assets, numerically ordered.
    pub images: Vec<String>,
}

/// The per-variant output record written to `<id>-<total>_combos.json` and
/// merged into the batch's combined `combos.json`.
///
/// Segment keys carry a leading underscore on the wire so downstream JSON
/// consumers keep them in insertion-safe string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderedCombo {
    pub variant_id: u32,
    pub av_segments: BTreeMap<String, Segment>,
    pub title: String,
    pub description: String,
    pub score: f64,
    pub score_reasoning: String,
    pub render_settings: RenderSettings,
    /// Rendered asset URL per format key.
    pub variants: BTreeMap<String, String>,
    /// Image asset URLs per format key, when image assets were generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<BTreeMap<String, Vec<String>>>,
    /// Generated headline/description pairs, when text assets were
    /// generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texts: Option<Vec<TextAsset>>,
}

impl RenderedCombo {
    /// Assemble the output record for a rendered variant.
    pub fn from_variant(
        variant: &VideoVariant,
        variants: BTreeMap<String, String>,
        images: Option<BTreeMap<String, Vec<String>>>,
        texts: Option<Vec<TextAsset>>,
    ) -> Self {
        let av_segments = variant
            .segments
            .iter()
            .map(|s| (format!("_{}", s.av_segment_id), s.clone()))
            .collect();

        Self {
            variant_id: variant.variant_id,
            av_segments,
            title: variant.title.clone(),
            description: variant.description.clone(),
            score: variant.score,
            score_reasoning: variant.score_reasoning.clone(),
            render_settings: variant.render_settings.clone(),
            variants,
            images,
            texts,
        }
    }

    /// The key this combo is stored under in the combined result file.
    pub fn combo_key(&self) -> String {
        format!("_{}", self.variant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Segment;

    fn variant() -> VideoVariant {
        VideoVariant {
            variant_id: 3,
            segments: vec![
                Segment::new("1", 0.0, 2.0),
                Segment::new("4.2", 10.0, 12.5),
            ],
            title: "Title".to_string(),
            description: "Description".to_string(),
            score: 9.0,
            score_reasoning: "reasoning".to_string(),
            render_settings: RenderSettings::default(),
        }
    }

    #[test]
    fn test_segment_keys_are_underscore_prefixed() {
        let combo = RenderedCombo::from_variant(&variant(), BTreeMap::new(), None, None);
        assert!(combo.av_segments.contains_key("_1"));
        assert!(combo.av_segments.contains_key("_4.2"));
        assert_eq!(combo.combo_key(), "_3");
    }

    #[test]
    fn test_optional_sections_are_omitted_from_json() {
        let combo = RenderedCombo::from_variant(&variant(), BTreeMap::new(), None, None);
        let json = serde_json::to_string(&combo).unwrap();
        assert!(!json.contains("\"images\""));
        assert!(!json.contains("\"texts\""));
    }

    #[test]
    fn test_round_trips_through_json() {
        let mut variants = BTreeMap::new();
        variants.insert("horizontal".to_string(), "https://host/b/combo_3_h.mp4".to_string());
        let combo = RenderedCombo::from_variant(
            &variant(),
            variants,
            None,
            Some(vec![TextAsset {
                headline: "H".to_string(),
                description: "D".to_string(),
            }]),
        );
        let json = serde_json::to_vec(&combo).unwrap();
        let back: RenderedCombo = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, combo);
    }
}
