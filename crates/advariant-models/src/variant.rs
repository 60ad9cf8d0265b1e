//! Video variants and per-variant render settings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::segment::{Segment, SegmentId};

/// Output formats a variant can be rendered in.
///
/// Horizontal is always rendered; square and vertical are opt-in per
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RenderFormat {
    Horizontal,
    Square,
    Vertical,
}

impl RenderFormat {
    /// The single-letter initial used in rendered video filenames.
    pub fn initial(&self) -> char {
        match self {
            RenderFormat::Horizontal => 'h',
            RenderFormat::Square => 's',
            RenderFormat::Vertical => 'v',
        }
    }

    /// The format name as used in result JSON keys.
    pub fn as_key(&self) -> &'static str {
        match self {
            RenderFormat::Horizontal => "horizontal",
            RenderFormat::Square => "square",
            RenderFormat::Vertical => "vertical",
        }
    }
}

impl fmt::Display for RenderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_key())
    }
}

impl FromStr for RenderFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "horizontal" => Ok(RenderFormat::Horizontal),
            "square" => Ok(RenderFormat::Square),
            "vertical" => Ok(RenderFormat::Vertical),
            _ => Err(FormatParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown render format: {0}")]
pub struct FormatParseError(String);

/// Where a continuous/overlay audio window is sampled from in the source
/// track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OverlayAnchor {
    /// Earliest referenced segment start (the default).
    #[default]
    VariantStart,
    /// Latest referenced segment end, minus the composed duration.
    VariantEnd,
    /// Beginning of the source track.
    VideoStart,
    /// End of the source track, minus the composed duration.
    VideoEnd,
}

impl FromStr for OverlayAnchor {
    type Err = AnchorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "variant_start" => Ok(OverlayAnchor::VariantStart),
            "variant_end" => Ok(OverlayAnchor::VariantEnd),
            "video_start" => Ok(OverlayAnchor::VideoStart),
            "video_end" => Ok(OverlayAnchor::VideoEnd),
            _ => Err(AnchorParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown overlay anchor: {0}")]
pub struct AnchorParseError(String);

// Unknown anchor values on the wire fall back to the default rather than
// failing the whole render file.
impl<'de> Deserialize<'de> for OverlayAnchor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(value.parse().unwrap_or_default())
    }
}

/// Immutable per-variant render settings.
///
/// Constructed once from the render file; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct RenderSettings {
    /// Whether to generate image assets.
    #[serde(default)]
    pub generate_image_assets: bool,
    /// Whether to generate text assets.
    #[serde(default)]
    pub generate_text_assets: bool,
    /// Formats to render beyond the implicit horizontal.
    #[serde(default)]
    pub formats: Vec<RenderFormat>,
    /// Replace per-segment background music with one contiguous section of
    /// the input's music track, merged under the speech track.
    #[serde(default)]
    pub use_music_overlay: bool,
    /// Replace per-segment audio entirely with one contiguous section of
    /// the input's audio track.
    #[serde(default)]
    pub use_continuous_audio: bool,
    /// Whether to fade out the end of the variant.
    #[serde(default)]
    pub fade_out: bool,
    /// Where the continuous/overlay window is sampled from.
    #[serde(default)]
    pub overlay_type: OverlayAnchor,
}

/// The audio strategy a variant resolves to once precedence is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioStrategy {
    /// Each segment keeps its own slice of the source audio.
    PerSegment,
    /// One contiguous window of the source audio replaces segment audio.
    ContinuousAudio,
    /// Speech track per segment, merged with a contiguous music window.
    MusicOverlay,
}

impl RenderSettings {
    /// Resolve the audio strategy. Continuous audio takes precedence over
    /// the music overlay when both are requested.
    pub fn audio_strategy(&self) -> AudioStrategy {
        if self.use_continuous_audio {
            AudioStrategy::ContinuousAudio
        } else if self.use_music_overlay {
            AudioStrategy::MusicOverlay
        } else {
            AudioStrategy::PerSegment
        }
    }

    /// Whether the given format was requested.
    pub fn wants_format(&self, format: RenderFormat) -> bool {
        format == RenderFormat::Horizontal || self.formats.contains(&format)
    }
}

/// One candidate assembled ad composition.
///
/// `segments` preserves the variant's creative order, which is not
/// necessarily timestamp order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoVariant {
    /// The id of the variant, unique within a batch.
    pub variant_id: u32,
    /// The A/V segments of the variant, in creative order.
    #[serde(rename = "av_segments")]
    pub segments: Vec<Segment>,
    /// The title of the variant.
    pub title: String,
    /// The description of the variant.
    pub description: String,
    /// The score of the variant.
    pub score: f64,
    /// The reasoning behind the score.
    pub score_reasoning: String,
    /// The render settings of the variant.
    pub render_settings: RenderSettings,
}

impl VideoVariant {
    /// The referenced segment ids, in creative order.
    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.segments.iter().map(|s| s.av_segment_id.clone()).collect()
    }

    /// Look up a segment by id.
    pub fn segment(&self, id: &SegmentId) -> Option<&Segment> {
        self.segments.iter().find(|s| &s.av_segment_id == id)
    }

    /// Parse a render file: a JSON array of variants. Variants without an
    /// explicit id get their array index.
    pub fn parse_render_file(contents: &[u8]) -> Result<Vec<VideoVariant>, serde_json::Error> {
        #[derive(Deserialize)]
        struct WireVariant {
            #[serde(default)]
            variant_id: Option<u32>,
            av_segments: Vec<Segment>,
            #[serde(default)]
            title: String,
            #[serde(default)]
            description: String,
            #[serde(default)]
            score: f64,
            #[serde(default)]
            score_reasoning: String,
            #[serde(default)]
            render_settings: RenderSettings,
        }

        let wire: Vec<WireVariant> = serde_json::from_slice(contents)?;
        Ok(wire
            .into_iter()
            .enumerate()
            .map(|(index, w)| VideoVariant {
                variant_id: w.variant_id.unwrap_or(index as u32),
                segments: w.av_segments,
                title: w.title,
                description: w.description,
                score: w.score,
                score_reasoning: w.score_reasoning,
                render_settings: w.render_settings,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuous_audio_takes_precedence() {
        let settings = RenderSettings {
            use_music_overlay: true,
            use_continuous_audio: true,
            ..Default::default()
        };
        assert_eq!(settings.audio_strategy(), AudioStrategy::ContinuousAudio);
    }

    #[test]
    fn test_audio_strategy_defaults_to_per_segment() {
        assert_eq!(
            RenderSettings::default().audio_strategy(),
            AudioStrategy::PerSegment
        );
    }

    #[test]
    fn test_horizontal_is_always_wanted() {
        let settings = RenderSettings::default();
        assert!(settings.wants_format(RenderFormat::Horizontal));
        assert!(!settings.wants_format(RenderFormat::Square));
    }

    #[test]
    fn test_overlay_anchor_unknown_value_falls_back() {
        let anchor: OverlayAnchor = serde_json::from_str("\"something_new\"").unwrap();
        assert_eq!(anchor, OverlayAnchor::VariantStart);

        let anchor: OverlayAnchor = serde_json::from_str("\"video_end\"").unwrap();
        assert_eq!(anchor, OverlayAnchor::VideoEnd);
    }

    #[test]
    fn test_parse_render_file_assigns_index_when_id_missing() {
        let raw = br#"[
            {
                "av_segments": [
                    {"av_segment_id": "1", "start_s": 0.0, "end_s": 2.0}
                ],
                "title": "A",
                "description": "first",
                "score": 8.5,
                "score_reasoning": "strong hook",
                "render_settings": {"fade_out": true, "formats": ["square"]}
            },
            {
                "variant_id": 7,
                "av_segments": [
                    {"av_segment_id": "2", "start_s": 2.0, "end_s": 4.0}
                ],
                "title": "B",
                "description": "second",
                "score": 6.0,
                "score_reasoning": "weaker",
                "render_settings": {}
            }
        ]"#;

        let variants = VideoVariant::parse_render_file(raw).unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].variant_id, 0);
        assert_eq!(variants[1].variant_id, 7);
        assert!(variants[0].render_settings.fade_out);
        assert!(variants[0].render_settings.wants_format(RenderFormat::Square));
    }

    #[test]
    fn test_segment_lookup_preserves_creative_order() {
        let raw = br#"[{
            "variant_id": 1,
            "av_segments": [
                {"av_segment_id": "5", "start_s": 50.0, "end_s": 55.0},
                {"av_segment_id": "1", "start_s": 0.0, "end_s": 5.0}
            ],
            "title": "t", "description": "d", "score": 1.0,
            "score_reasoning": "r", "render_settings": {}
        }]"#;

        let variant = &VideoVariant::parse_render_file(raw).unwrap()[0];
        let ids = variant.segment_ids();
        assert_eq!(ids[0].as_str(), "5");
        assert_eq!(ids[1].as_str(), "1");
        assert!((variant.segment(&"1".into()).unwrap().start_s - 0.0).abs() < f64::EPSILON);
    }
}
