//! The persisted file-naming protocol.
//!
//! These names are shared with the upstream extraction stage and the
//! trigger wiring; they must stay bit-exact.

/// Basename of the source video in the root video folder (any extension).
pub const INPUT_FILENAME: &str = "input";

/// Audio sidecar whose presence marks the source as having an audio track.
pub const INPUT_AUDIO_FILE: &str = "input.wav";

/// Separated speech track produced by the extraction stage.
pub const SPEECH_FILE: &str = "vocals.wav";

/// Separated music track produced by the extraction stage.
pub const MUSIC_FILE: &str = "accompaniment.wav";

/// Detected source language, one line of text.
pub const LANGUAGE_FILE: &str = "language.txt";

/// Fallback when no language file exists.
pub const DEFAULT_VIDEO_LANGUAGE: &str = "English";

/// Batch render trigger and per-variant trigger suffix.
pub const RENDER_FILE: &str = "render.json";

/// Finalise trigger suffix (zero-byte marker).
pub const FINALISE_RENDER_FILE: &str = "finalise_render.json";

/// Per-variant partial suffix and the combined result name.
pub const COMBINATIONS_FILE: &str = "combos.json";

/// Crop-command files for the shared cropped source videos.
pub const SQUARE_CROP_FILE: &str = "square.txt";
pub const VERTICAL_CROP_FILE: &str = "vertical.txt";

/// Subdirectory holding generated image assets for one variant.
pub const ASSETS_DIR: &str = "assets";

/// End-slate job config trigger.
pub const END_SLATE_FILE: &str = "end_slate.json";

/// Prefix of folders produced by the end-slate post-processor.
pub const CTA_FOLDER_PREFIX: &str = "CTA - ";

/// Suffix of render-batch folders.
pub const COMBOS_FOLDER_SUFFIX: &str = "-combos";

/// Per-variant render trigger: `<variantId>-<total>_render.json`.
pub fn variant_render_file(variant_id: u32, total: u32) -> String {
    format!("{variant_id}-{total}_{RENDER_FILE}")
}

/// Per-variant partial result: `<variantId>-<total>_combos.json`.
pub fn variant_combos_file(variant_id: u32, total: u32) -> String {
    format!("{variant_id}-{total}_{COMBINATIONS_FILE}")
}

/// Finalise trigger marker: `<total>-<total>_finalise_render.json`.
pub fn finalise_trigger_file(total: u32) -> String {
    format!("{total}-{total}_{FINALISE_RENDER_FILE}")
}

/// Rendered video name: `combo_<variantId>_<formatInitial><ext>`.
///
/// `ext` includes the leading dot.
pub fn combo_video_file(variant_id: u32, format_initial: char, ext: &str) -> String {
    format!("combo_{variant_id}_{format_initial}{ext}")
}

/// Folder for one variant's generated assets: `combo_<variantId>`.
pub fn variant_folder(variant_id: u32) -> String {
    format!("combo_{variant_id}")
}

/// Parse the `<variantId>-<total>` token off a trigger/partial filename.
///
/// Returns `None` when the name does not carry the token.
pub fn parse_variant_token(file_name: &str) -> Option<(u32, u32)> {
    let token = file_name.split('_').next()?;
    let (variant, total) = token.split_once('-')?;
    Some((variant.parse().ok()?, total.parse().ok()?))
}

/// Numeric sort key for image asset filenames (`"2.png"` -> `2`).
///
/// Image assets must sort numerically, not lexically, so `10.png` follows
/// `9.png`.
pub fn numeric_asset_key(file_name: &str) -> Option<u32> {
    let stem = file_name
        .rsplit('/')
        .next()?
        .trim_end_matches(".png")
        .trim_end_matches(".jpg");
    stem.parse().ok()
}
