//! Supplementary image-asset generation.
//!
//! Thumbnails come from FFmpeg's scene-change `thumbnail` filter; key
//! frames come from timestamps the vision model identifies. Both are
//! creative extras: every failure here is logged and produces fewer
//! assets, never a failed render.

use std::path::Path;

use tracing::{info, warn};

use advariant_media::{FfmpegCommand, FfmpegRunner};
use advariant_models::{naming, RenderFormat};

use crate::error::WorkerResult;
use crate::gemini::GeminiClient;

/// Generate image assets for one rendered format.
///
/// Returns asset paths relative to `output_dir`, numerically ordered.
pub async fn generate_image_assets(
    gemini: Option<&GeminiClient>,
    video_path: &Path,
    video_uri: &str,
    output_dir: &Path,
    variant_id: u32,
    format: RenderFormat,
) -> WorkerResult<Vec<String>> {
    let relative_dir = format!(
        "{}/{}/{}",
        naming::variant_folder(variant_id),
        naming::ASSETS_DIR,
        format.as_key()
    );
    let assets_dir = output_dir.join(&relative_dir);
    tokio::fs::create_dir_all(&assets_dir).await?;

    if let Err(e) = extract_thumbnails(video_path, &assets_dir).await {
        warn!(
            variant_id,
            format = %format,
            error = %e,
            "Thumbnail extraction failed; continuing without thumbnails"
        );
    }

    match gemini {
        Some(gemini) => {
            extract_key_frames(gemini, video_path, video_uri, &assets_dir).await;
        }
        None => warn!("No generative model configured; skipping key frames"),
    }

    let mut assets = collect_numeric_assets(&assets_dir).await?;
    for asset in &mut assets {
        *asset = format!("{relative_dir}/{asset}");
    }

    info!(
        variant_id,
        format = %format,
        count = assets.len(),
        "Generated image assets"
    );
    Ok(assets)
}

/// Extract scene-change thumbnails as `<n>.png`.
async fn extract_thumbnails(video_path: &Path, assets_dir: &Path) -> WorkerResult<()> {
    let cmd = FfmpegCommand::new(assets_dir.join("%d.png"))
        .input(video_path)
        .video_filter("thumbnail")
        .output_args(["-vsync", "vfr"]);
    FfmpegRunner::new().run(&cmd).await?;
    Ok(())
}

/// Ask the vision model for key timestamps and extract one frame each as
/// `<n>.jpg`. Identification and each extraction fail independently.
async fn extract_key_frames(
    gemini: &GeminiClient,
    video_path: &Path,
    video_uri: &str,
    assets_dir: &Path,
) {
    let timestamps = match gemini.identify_key_frames(video_uri).await {
        Ok(timestamps) => timestamps,
        Err(e) => {
            warn!(error = %e, "Key-frame identification failed");
            return;
        }
    };

    for (index, timestamp) in timestamps.iter().enumerate() {
        let cmd = FfmpegCommand::new(assets_dir.join(format!("{}.jpg", index + 1)))
            .input_with_args(["-ss", timestamp.as_str()], video_path)
            .single_frame()
            .output_args(["-q:v", "2"]);
        if let Err(e) = FfmpegRunner::new().run(&cmd).await {
            warn!(timestamp = %timestamp, error = %e, "Key-frame extraction failed");
        }
    }
}

/// List `<n>.png`/`<n>.jpg` files in a directory, sorted numerically.
pub async fn collect_numeric_assets(dir: &Path) -> WorkerResult<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if naming::numeric_asset_key(&name).is_some() {
            names.push(name);
        }
    }
    names.sort_by_key(|n| naming::numeric_asset_key(n));
    Ok(names)
}

/// Build the public URL of an object, percent-encoding each folder
/// segment but keeping the path structure.
pub fn public_url(base_url: &str, bucket: &str, folder: &str, relative: &str) -> String {
    let encoded_folder = folder
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!(
        "{}/{}/{}/{}",
        base_url.trim_end_matches('/'),
        bucket,
        encoded_folder,
        relative
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_collect_numeric_assets_sorts_numerically() {
        let dir = TempDir::new().unwrap();
        for name in ["10.png", "2.jpg", "1.png", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let assets = collect_numeric_assets(dir.path()).await.unwrap();
        assert_eq!(assets, vec!["1.png", "2.jpg", "10.png"]);
    }

    #[test]
    fn test_public_url_encodes_folder_segments() {
        let url = public_url(
            "https://storage.example.com",
            "ads",
            "demo video/1234-combos",
            "combo_2_h.mp4",
        );
        assert_eq!(
            url,
            "https://storage.example.com/ads/demo%20video/1234-combos/combo_2_h.mp4"
        );
    }
}
