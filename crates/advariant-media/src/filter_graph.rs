//! Filter-graph synthesis for variant rendering.
//!
//! One select/concat branch pair is emitted per time span. Three programs
//! are produced for every variant; the caller picks exactly one based on
//! the variant's audio strategy:
//!
//! - **full**: per-span video + audio selection, concatenated.
//! - **music overlay**: per-span speech selection (input `1:a`) merged with
//!   one contiguous window of the music track (input `2:a`).
//! - **continuous audio**: per-span video only, audio replaced by one
//!   contiguous window of the source track.
//!
//! Without a source audio track all three degrade to video-only
//! concatenation.

use std::path::Path;

use advariant_models::{AudioStrategy, OverlayAnchor, RenderSettings};
use tracing::warn;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};

/// Audio fade-out length in seconds.
pub const FADE_OUT_DURATION_S: f64 = 2.0;

/// Safety buffer between fade end and video end, in seconds.
pub const FADE_OUT_BUFFER_S: f64 = 1.0;

/// A half-open time window `[start_s, end_s)` in the source track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSpan {
    pub start_s: f64,
    pub end_s: f64,
}

impl TimeSpan {
    pub fn new(start_s: f64, end_s: f64) -> Self {
        Self { start_s, end_s }
    }

    pub fn duration(&self) -> f64 {
        self.end_s - self.start_s
    }
}

/// The three candidate filter-graph programs for one variant.
#[derive(Debug, Clone)]
pub struct FilterPrograms {
    /// Per-span audio and video, concatenated.
    pub full: String,
    /// Speech track per span, merged with a contiguous music window.
    pub music_overlay: String,
    /// Video per span, one contiguous source-audio window.
    pub continuous_audio: String,
    /// Total composed duration, the sum of span durations.
    pub total_duration: f64,
}

/// Resolve the start of the sampled overlay/continuous window.
///
/// The window always has length equal to the composed duration, so only
/// the start needs resolving.
pub fn resolve_overlay_start(
    anchor: OverlayAnchor,
    spans: &[TimeSpan],
    source_duration: f64,
) -> f64 {
    let total: f64 = spans.iter().map(|s| s.duration()).sum();
    let first_start = spans
        .iter()
        .map(|s| s.start_s)
        .fold(f64::INFINITY, f64::min);
    let last_end = spans.iter().map(|s| s.end_s).fold(0.0, f64::max);

    match anchor {
        OverlayAnchor::VideoStart => 0.0,
        OverlayAnchor::VideoEnd => source_duration - total,
        OverlayAnchor::VariantEnd => last_end - total,
        OverlayAnchor::VariantStart => first_start,
    }
}

/// Synthesize the three filter-graph programs for one variant.
///
/// `spans` is one window per select/concat branch, in creative order.
/// An empty span list is a contract violation, never an empty render.
pub fn build_filter_programs(
    spans: &[TimeSpan],
    has_audio: bool,
    settings: &RenderSettings,
    source_duration: f64,
) -> MediaResult<FilterPrograms> {
    if spans.is_empty() {
        return Err(MediaError::EmptyVariant);
    }

    let mut video_select = Vec::with_capacity(spans.len());
    let mut audio_select = Vec::with_capacity(spans.len());
    let mut concat_labels = Vec::with_capacity(spans.len() * 2);

    for (idx, span) in spans.iter().enumerate() {
        let selection = format!("between(t,{},{})", span.start_s, span.end_s);
        video_select.push(format!(
            "[0:v]select='{selection}',setpts=N/FRAME_RATE/TB[v{idx}];"
        ));
        concat_labels.push(format!("[v{idx}]"));
        if has_audio {
            audio_select.push(format!(
                "[0:a]aselect='{selection}',asetpts=N/SR/TB[a{idx}];"
            ));
            concat_labels.push(format!("[a{idx}]"));
        }
    }

    let n = spans.len();
    let total: f64 = spans.iter().map(|s| s.duration()).sum();

    let video_only: String = {
        let video_labels: Vec<&String> = concat_labels
            .iter()
            .filter(|l| l.starts_with("[v"))
            .collect();
        format!(
            "{}{}concat=n={}:v=1[outv]",
            video_select.join(""),
            video_labels
                .iter()
                .map(|s| s.as_str())
                .collect::<String>(),
            n
        )
    };

    if !has_audio {
        return Ok(FilterPrograms {
            full: video_only.clone(),
            music_overlay: video_only.clone(),
            continuous_audio: video_only,
            total_duration: total,
        });
    }

    let fade_out_start = total - FADE_OUT_DURATION_S - FADE_OUT_BUFFER_S;
    let fade_out_filter = if settings.fade_out {
        format!(";[outa]afade=t=out:st={fade_out_start}:d={FADE_OUT_DURATION_S}[outa]")
    } else {
        String::new()
    };

    let overlay_start = resolve_overlay_start(settings.overlay_type, spans, source_duration);
    let overlay_end = overlay_start + total;

    let full = format!(
        "{}{}{}concat=n={}:v=1:a=1[outv][outa]{}",
        video_select.join(""),
        audio_select.join(""),
        concat_labels.join(""),
        n,
        fade_out_filter
    );

    let music_overlay = format!(
        "{}{}[2:a]aselect='between(t,{},{})',asetpts=N/SR/TB[music];{}concat=n={}:v=1:a=1[outv][tempa];[tempa][music]amerge=inputs=2[outa]{}",
        video_select.join(""),
        audio_select
            .iter()
            .map(|entry| entry.replace("0:a", "1:a"))
            .collect::<String>(),
        overlay_start,
        overlay_end,
        concat_labels.join(""),
        n,
        fade_out_filter
    );

    let continuous_audio = format!(
        "{}[0:a]aselect='between(t,{},{})',asetpts=N/SR/TB[outa];{}concat=n={}:v=1[outv]{}",
        video_select.join(""),
        overlay_start,
        overlay_end,
        concat_labels
            .iter()
            .filter(|l| l.starts_with("[v"))
            .map(|s| s.as_str())
            .collect::<String>(),
        n,
        fade_out_filter
    );

    Ok(FilterPrograms {
        full,
        music_overlay,
        continuous_audio,
        total_duration: total,
    })
}

/// Build the render command for one variant against one source video.
///
/// Picks the filter program by strategy (continuous audio wins over the
/// music overlay) and wires up the speech/music inputs when the overlay is
/// used. Overlay mode needs both extra tracks; when either is missing the
/// command falls back to the full per-segment program rather than
/// referencing inputs that do not exist.
pub fn build_variant_command(
    video_path: &Path,
    speech_track: Option<&Path>,
    music_track: Option<&Path>,
    has_audio: bool,
    settings: &RenderSettings,
    programs: &FilterPrograms,
    output: &Path,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(output).input(video_path);
    let mut filter: &str = &programs.full;
    let mut force_stereo = false;

    if has_audio {
        match settings.audio_strategy() {
            AudioStrategy::ContinuousAudio => filter = &programs.continuous_audio,
            AudioStrategy::MusicOverlay => match (speech_track, music_track) {
                (Some(speech), Some(music)) => {
                    cmd = cmd.input(speech).input(music);
                    filter = &programs.music_overlay;
                    force_stereo = true;
                }
                _ => {
                    warn!(
                        "Music overlay requested but speech/music tracks are missing; \
                         using per-segment audio"
                    );
                }
            },
            AudioStrategy::PerSegment => {}
        }
    }

    cmd = cmd.filter_complex(filter);
    if force_stereo {
        cmd = cmd.audio_channels(2);
    }
    cmd = cmd.map("[outv]");
    if has_audio {
        cmd = cmd.map("[outa]");
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans() -> Vec<TimeSpan> {
        vec![TimeSpan::new(0.0, 2.0), TimeSpan::new(10.0, 12.5)]
    }

    fn settings() -> RenderSettings {
        RenderSettings::default()
    }

    #[test]
    fn test_full_program_shape() {
        let programs = build_filter_programs(&spans(), true, &settings(), 100.0).unwrap();
        assert_eq!(
            programs.full,
            "[0:v]select='between(t,0,2)',setpts=N/FRAME_RATE/TB[v0];\
             [0:v]select='between(t,10,12.5)',setpts=N/FRAME_RATE/TB[v1];\
             [0:a]aselect='between(t,0,2)',asetpts=N/SR/TB[a0];\
             [0:a]aselect='between(t,10,12.5)',asetpts=N/SR/TB[a1];\
             [v0][a0][v1][a1]concat=n=2:v=1:a=1[outv][outa]"
        );
        assert!((programs.total_duration - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_window_length_equals_composed_duration() {
        let programs = build_filter_programs(&spans(), true, &settings(), 100.0).unwrap();
        // Anchor defaults to variant start (min span start = 0), so the
        // window is exactly [0, total).
        assert!(programs
            .continuous_audio
            .contains("[0:a]aselect='between(t,0,4.5)',asetpts=N/SR/TB[outa];"));
        assert!(programs
            .music_overlay
            .contains("[2:a]aselect='between(t,0,4.5)',asetpts=N/SR/TB[music];"));
    }

    #[test]
    fn test_music_overlay_reads_speech_from_second_input() {
        let programs = build_filter_programs(&spans(), true, &settings(), 100.0).unwrap();
        assert!(programs.music_overlay.contains("[1:a]aselect="));
        assert!(!programs.music_overlay.contains("[0:a]aselect="));
        assert!(programs
            .music_overlay
            .ends_with("[tempa][music]amerge=inputs=2[outa]"));
    }

    #[test]
    fn test_continuous_audio_concats_video_only() {
        let programs = build_filter_programs(&spans(), true, &settings(), 100.0).unwrap();
        assert!(programs
            .continuous_audio
            .contains("[v0][v1]concat=n=2:v=1[outv]"));
        assert!(!programs.continuous_audio.contains("[a0]"));
    }

    #[test]
    fn test_fade_out_placement() {
        let settings = RenderSettings {
            fade_out: true,
            ..Default::default()
        };
        let programs = build_filter_programs(&spans(), true, &settings, 100.0).unwrap();
        // total 4.5 - fade 2 - buffer 1 = 1.5
        let fade = ";[outa]afade=t=out:st=1.5:d=2[outa]";
        assert!(programs.full.ends_with(fade));
        assert!(programs.music_overlay.ends_with(fade));
        assert!(programs.continuous_audio.ends_with(fade));
    }

    #[test]
    fn test_fade_absent_when_disabled() {
        let programs = build_filter_programs(&spans(), true, &settings(), 100.0).unwrap();
        assert!(!programs.full.contains("afade"));
        assert!(!programs.music_overlay.contains("afade"));
        assert!(!programs.continuous_audio.contains("afade"));
    }

    #[test]
    fn test_no_audio_degrades_all_programs_to_video_only() {
        let programs = build_filter_programs(&spans(), false, &settings(), 100.0).unwrap();
        let expected = "[0:v]select='between(t,0,2)',setpts=N/FRAME_RATE/TB[v0];\
                        [0:v]select='between(t,10,12.5)',setpts=N/FRAME_RATE/TB[v1];\
                        [v0][v1]concat=n=2:v=1[outv]";
        assert_eq!(programs.full, expected);
        assert_eq!(programs.music_overlay, expected);
        assert_eq!(programs.continuous_audio, expected);
    }

    #[test]
    fn test_zero_spans_is_a_contract_violation() {
        let result = build_filter_programs(&[], true, &settings(), 100.0);
        assert!(matches!(result, Err(MediaError::EmptyVariant)));
    }

    #[test]
    fn test_overlay_anchor_resolution() {
        let spans = vec![TimeSpan::new(5.0, 7.0), TimeSpan::new(10.0, 12.5)];
        // total = 4.5
        assert_eq!(
            resolve_overlay_start(OverlayAnchor::VideoStart, &spans, 100.0),
            0.0
        );
        assert!(
            (resolve_overlay_start(OverlayAnchor::VideoEnd, &spans, 100.0) - 95.5).abs() < 1e-9
        );
        assert!(
            (resolve_overlay_start(OverlayAnchor::VariantEnd, &spans, 100.0) - 8.0).abs() < 1e-9
        );
        assert!(
            (resolve_overlay_start(OverlayAnchor::VariantStart, &spans, 100.0) - 5.0).abs() < 1e-9
        );
    }

    #[test]
    fn test_variant_command_continuous_audio_wins() {
        let settings = RenderSettings {
            use_music_overlay: true,
            use_continuous_audio: true,
            ..Default::default()
        };
        let programs = build_filter_programs(&spans(), true, &settings, 100.0).unwrap();
        let cmd = build_variant_command(
            Path::new("input.mp4"),
            Some(Path::new("vocals.wav")),
            Some(Path::new("accompaniment.wav")),
            true,
            &settings,
            &programs,
            Path::new("combo_1_h.mp4"),
        );
        let args = cmd.build_args();
        let filter_pos = args.iter().position(|a| a == "-filter_complex").unwrap();
        assert_eq!(args[filter_pos + 1], programs.continuous_audio);
        // Continuous audio uses only the source video input.
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
        assert!(!args.contains(&"-ac".to_string()));
    }

    #[test]
    fn test_variant_command_music_overlay_adds_tracks_and_stereo() {
        let settings = RenderSettings {
            use_music_overlay: true,
            ..Default::default()
        };
        let programs = build_filter_programs(&spans(), true, &settings, 100.0).unwrap();
        let cmd = build_variant_command(
            Path::new("input.mp4"),
            Some(Path::new("vocals.wav")),
            Some(Path::new("accompaniment.wav")),
            true,
            &settings,
            &programs,
            Path::new("combo_1_h.mp4"),
        );
        let args = cmd.build_args();
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 3);
        assert!(args.contains(&"-ac".to_string()));
        let filter_pos = args.iter().position(|a| a == "-filter_complex").unwrap();
        assert_eq!(args[filter_pos + 1], programs.music_overlay);
    }

    #[test]
    fn test_variant_command_overlay_without_tracks_falls_back() {
        let settings = RenderSettings {
            use_music_overlay: true,
            ..Default::default()
        };
        let programs = build_filter_programs(&spans(), true, &settings, 100.0).unwrap();
        let cmd = build_variant_command(
            Path::new("input.mp4"),
            None,
            None,
            true,
            &settings,
            &programs,
            Path::new("combo_1_h.mp4"),
        );
        let args = cmd.build_args();
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
        let filter_pos = args.iter().position(|a| a == "-filter_complex").unwrap();
        assert_eq!(args[filter_pos + 1], programs.full);
    }

    #[test]
    fn test_variant_command_no_audio_maps_video_only() {
        let programs = build_filter_programs(&spans(), false, &settings(), 100.0).unwrap();
        let cmd = build_variant_command(
            Path::new("input.mp4"),
            None,
            None,
            false,
            &settings(),
            &programs,
            Path::new("combo_1_h.mp4"),
        );
        let args = cmd.build_args();
        let maps: Vec<_> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "-map")
            .map(|(i, _)| args[i + 1].clone())
            .collect();
        assert_eq!(maps, vec!["[outv]"]);
    }
}
