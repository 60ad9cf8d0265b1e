//! Variant rendering orchestration.
//!
//! The initial render builds the shared cropped source videos once per
//! batch and fans out one trigger file per variant; each variant render
//! then runs independently and reports back through the fan-in check.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use advariant_media::{
    build_filter_programs, build_variant_command, crop_command_filter, parse_crop_dimensions,
    probe_video, FfmpegCommand, FfmpegRunner, TimeSpan, SQUARE_BLUR_FILTER,
    VERTICAL_BLUR_FILTER,
};
use advariant_models::{
    group_consecutive_segments, naming, FormatOutput, RenderFormat, RenderedCombo, VideoVariant,
};
use advariant_storage::StorageClient;

use crate::assets::{generate_image_assets, public_url};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::fanin;
use crate::gemini::GeminiClient;
use crate::trigger::TriggerFile;

/// Everything a render invocation needs.
pub struct RenderContext {
    pub storage: StorageClient,
    pub gemini: Option<GeminiClient>,
    pub config: WorkerConfig,
}

impl RenderContext {
    pub fn new(storage: StorageClient, gemini: Option<GeminiClient>, config: WorkerConfig) -> Self {
        Self {
            storage,
            gemini,
            config,
        }
    }

    fn runner(&self) -> FfmpegRunner {
        FfmpegRunner::new().with_timeout(self.config.ffmpeg_timeout.as_secs())
    }

    /// Initial render: create the shared cropped sources and fan the batch
    /// out into one `<id>-<total>_render.json` trigger per variant.
    pub async fn initial_render(&self, trigger: &TriggerFile) -> WorkerResult<()> {
        info!(folder = %trigger.folder, "Starting initial render");
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let tmp_dir = tempfile::tempdir_in(&self.config.work_dir)?;

        let video_path = self
            .download_source_video(&trigger.root_folder, tmp_dir.path())
            .await?;
        let video_ext = file_extension(&video_path);

        let render_contents = self
            .storage
            .download_bytes(&trigger.full_path)
            .await?
            .ok_or_else(|| {
                WorkerError::job_failed(format!("Missing render file: {}", trigger.full_path))
            })?;
        let variants = VideoVariant::parse_render_file(&render_contents)?;
        info!(count = variants.len(), "Rendering video variants");

        let out_dir = tempfile::tempdir_in(&self.config.work_dir)?;
        for (format, crop_file_name) in [
            (RenderFormat::Square, naming::SQUARE_CROP_FILE),
            (RenderFormat::Vertical, naming::VERTICAL_CROP_FILE),
        ] {
            if !variants
                .iter()
                .any(|v| v.render_settings.formats.contains(&format))
            {
                continue;
            }
            let crop_file = self
                .storage
                .download_to_dir(
                    &format!("{}/{}", trigger.folder, crop_file_name),
                    tmp_dir.path(),
                )
                .await?;
            self.render_cropped_source(&video_path, crop_file, format, &video_ext, out_dir.path())
                .await?;
        }
        self.storage.upload_dir(out_dir.path(), &trigger.folder).await?;

        let total = variants.len() as u32;
        for variant in &variants {
            let name = naming::variant_render_file(variant.variant_id, total);
            let contents = serde_json::to_vec_pretty(&[variant])?;
            self.storage
                .upload_bytes(
                    contents,
                    &format!("{}/{}", trigger.folder, name),
                    "application/json",
                )
                .await?;
        }

        info!("Initial render completed successfully");
        Ok(())
    }

    /// Render one cropped source video by replaying the batch's
    /// crop-command file. Without a crop file the format later falls back
    /// to the blur-pad filter, so absence is not an error.
    async fn render_cropped_source(
        &self,
        video_path: &Path,
        crop_file: Option<PathBuf>,
        format: RenderFormat,
        video_ext: &str,
        out_dir: &Path,
    ) -> WorkerResult<Option<PathBuf>> {
        let crop_file = match crop_file {
            Some(crop_file) => crop_file,
            None => {
                info!(format = %format, "No crop-command file; format will use the blur-pad fallback");
                return Ok(None);
            }
        };

        let contents = tokio::fs::read_to_string(&crop_file).await?;
        let first_line = contents.lines().next().unwrap_or_default();
        let (width, height) = parse_crop_dimensions(first_line).ok_or_else(|| {
            WorkerError::processing_failed(format!(
                "Malformed crop-command file: {}",
                crop_file.display()
            ))
        })?;

        let output = out_dir.join(format!("{}{}", format.as_key(), video_ext));
        let cmd = FfmpegCommand::new(&output)
            .input(video_path)
            .filter_complex(crop_command_filter(
                &crop_file.to_string_lossy(),
                &width,
                &height,
            ));
        self.runner().run(&cmd).await?;

        info!(format = %format, "Created cropped source video");
        Ok(Some(output))
    }

    /// Render one variant in every requested format and upload its partial
    /// result.
    pub async fn render_variant(
        &self,
        trigger: &TriggerFile,
        variant_id: u32,
        total: u32,
    ) -> WorkerResult<()> {
        info!(variant_id, "Starting variant render");
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let tmp_dir = tempfile::tempdir_in(&self.config.work_dir)?;
        let tmp = tmp_dir.path();

        let root = &trigger.root_folder;
        let video_path = self.download_source_video(root, tmp).await?;
        let video_ext = file_extension(&video_path);

        let has_audio = self
            .storage
            .exists(&format!("{root}/{}", naming::INPUT_AUDIO_FILE))
            .await?;
        info!(has_audio, "Source audio track check");

        let speech_track = self
            .storage
            .download_to_dir(&format!("{root}/{}", naming::SPEECH_FILE), tmp)
            .await?;
        let music_track = self
            .storage
            .download_to_dir(&format!("{root}/{}", naming::MUSIC_FILE), tmp)
            .await?;

        let language = match self
            .storage
            .download_bytes(&format!("{root}/{}", naming::LANGUAGE_FILE))
            .await?
        {
            Some(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
            None => naming::DEFAULT_VIDEO_LANGUAGE.to_string(),
        };

        let square_video = self
            .storage
            .download_to_dir(
                &format!("{}/{}{}", trigger.folder, RenderFormat::Square.as_key(), video_ext),
                tmp,
            )
            .await?;
        let vertical_video = self
            .storage
            .download_to_dir(
                &format!("{}/{}{}", trigger.folder, RenderFormat::Vertical.as_key(), video_ext),
                tmp,
            )
            .await?;

        let render_contents = self
            .storage
            .download_bytes(&trigger.full_path)
            .await?
            .ok_or_else(|| {
                WorkerError::job_failed(format!("Missing render file: {}", trigger.full_path))
            })?;
        let variant = VideoVariant::parse_render_file(&render_contents)?
            .into_iter()
            .next()
            .ok_or_else(|| WorkerError::job_failed("Variant trigger holds no variant"))?;
        let settings = variant.render_settings.clone();

        let spans = variant_spans(&variant)?;
        let source_info = probe_video(&video_path).await?;
        let programs =
            build_filter_programs(&spans, has_audio, &settings, source_info.duration)?;

        let combos_dir = tempfile::tempdir_in(&self.config.work_dir)?;
        let out = combos_dir.path();
        let mut rendered: BTreeMap<String, FormatOutput> = BTreeMap::new();

        // Horizontal is always rendered, straight from the source video.
        let horizontal_name = naming::combo_video_file(
            variant.variant_id,
            RenderFormat::Horizontal.initial(),
            &video_ext,
        );
        let horizontal_path = out.join(&horizontal_name);
        let cmd = build_variant_command(
            &video_path,
            speech_track.as_deref(),
            music_track.as_deref(),
            has_audio,
            &settings,
            &programs,
            &horizontal_path,
        );
        self.runner().run(&cmd).await?;

        let images = self
            .maybe_generate_images(
                settings.generate_image_assets,
                out,
                &trigger.folder,
                &horizontal_path,
                &horizontal_name,
                variant.variant_id,
                RenderFormat::Horizontal,
            )
            .await;
        rendered.insert(
            RenderFormat::Horizontal.as_key().to_string(),
            FormatOutput {
                path: horizontal_name.clone(),
                images,
            },
        );

        for (format, cropped_source, blur_filter) in [
            (RenderFormat::Square, square_video.clone(), SQUARE_BLUR_FILTER),
            (RenderFormat::Vertical, vertical_video.clone(), VERTICAL_BLUR_FILTER),
        ] {
            if !settings.wants_format(format) {
                continue;
            }
            info!(variant_id, format = %format, "Rendering format");

            let name =
                naming::combo_video_file(variant.variant_id, format.initial(), &video_ext);
            let path = out.join(&name);
            match cropped_source {
                Some(cropped_path) => {
                    let cmd = build_variant_command(
                        &cropped_path,
                        speech_track.as_deref(),
                        music_track.as_deref(),
                        has_audio,
                        &settings,
                        &programs,
                        &path,
                    );
                    self.runner().run(&cmd).await?;
                }
                None => {
                    // No cropped source for this batch: blur-pad the
                    // finished horizontal render instead.
                    let cmd = FfmpegCommand::new(&path)
                        .input(&horizontal_path)
                        .video_filter(blur_filter);
                    self.runner().run(&cmd).await?;
                }
            }

            let images = self
                .maybe_generate_images(
                    settings.generate_image_assets,
                    out,
                    &trigger.folder,
                    &path,
                    &name,
                    variant.variant_id,
                    format,
                )
                .await;
            rendered.insert(format.as_key().to_string(), FormatOutput { path: name, images });
        }

        self.storage.upload_dir(out, &trigger.folder).await?;

        let texts = if settings.generate_text_assets {
            self.generate_texts(&trigger.folder, &horizontal_name, &language)
                .await
        } else {
            None
        };

        let mut variant_urls = BTreeMap::new();
        let mut image_urls: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (format_key, output) in &rendered {
            variant_urls.insert(
                format_key.clone(),
                self.object_url(&trigger.folder, &output.path),
            );
            if !output.images.is_empty() {
                image_urls.insert(
                    format_key.clone(),
                    output
                        .images
                        .iter()
                        .map(|relative| self.object_url(&trigger.folder, relative))
                        .collect(),
                );
            }
        }
        let image_urls = if image_urls.is_empty() {
            None
        } else {
            Some(image_urls)
        };

        let combo = RenderedCombo::from_variant(&variant, variant_urls, image_urls, texts);
        let mut combos = BTreeMap::new();
        combos.insert(combo.combo_key(), combo);

        let partial_name = naming::variant_combos_file(variant_id, total);
        self.storage
            .upload_bytes(
                serde_json::to_vec_pretty(&combos)?,
                &format!("{}/{}", trigger.folder, partial_name),
                "application/json",
            )
            .await?;

        fanin::check_finalise(&self.storage, &trigger.folder, total).await?;

        info!(variant_id, "Variant render completed successfully");
        Ok(())
    }

    /// Generate image assets for one rendered format. Soft path: any
    /// failure logs and yields no assets.
    #[allow(clippy::too_many_arguments)]
    async fn maybe_generate_images(
        &self,
        enabled: bool,
        out: &Path,
        folder: &str,
        video_path: &Path,
        video_name: &str,
        variant_id: u32,
        format: RenderFormat,
    ) -> Vec<String> {
        if !enabled {
            return Vec::new();
        }
        // The model reads the video by URI, so the render output must be
        // uploaded before asking for key frames.
        if let Err(e) = self.storage.upload_dir(out, folder).await {
            warn!(variant_id, error = %e, "Upload before asset generation failed; skipping image assets");
            return Vec::new();
        }
        let uri = self.object_url(folder, video_name);
        match generate_image_assets(
            self.gemini.as_ref(),
            video_path,
            &uri,
            out,
            variant_id,
            format,
        )
        .await
        {
            Ok(images) => images,
            Err(e) => {
                warn!(
                    variant_id,
                    format = %format,
                    error = %e,
                    "Image asset generation failed; continuing without image assets"
                );
                Vec::new()
            }
        }
    }

    /// Generate text assets. Soft path: empty or failed generation yields
    /// `None` and the render proceeds.
    async fn generate_texts(
        &self,
        folder: &str,
        horizontal_name: &str,
        language: &str,
    ) -> Option<Vec<advariant_models::TextAsset>> {
        let gemini = match &self.gemini {
            Some(gemini) => gemini,
            None => {
                warn!("No generative model configured; skipping text assets");
                return None;
            }
        };
        let uri = self.object_url(folder, horizontal_name);
        match gemini.generate_text_assets(&uri, language).await {
            Ok(assets) if !assets.is_empty() => Some(assets),
            Ok(_) => {
                warn!("Model returned no text assets; continuing");
                None
            }
            Err(e) => {
                warn!(error = %e, "Text asset generation failed; continuing");
                None
            }
        }
    }

    fn object_url(&self, folder: &str, relative: &str) -> String {
        public_url(
            &self.config.public_base_url,
            self.storage.bucket(),
            folder,
            relative,
        )
    }

    /// Find and download the source video under the root folder. The
    /// source shares its basename with the audio sidecar and language
    /// file, so anything that is not one of those is the video.
    async fn download_source_video(&self, root: &str, out: &Path) -> WorkerResult<PathBuf> {
        let objects = self
            .storage
            .list(&format!("{root}/{}", naming::INPUT_FILENAME), None)
            .await?;
        let video_key = objects
            .iter()
            .map(|o| o.key.clone())
            .find(|k| !k.ends_with(".wav") && !k.ends_with(".txt"))
            .ok_or_else(|| {
                WorkerError::job_failed(format!("No source video under {root}/"))
            })?;
        info!(key = %video_key, "Source video");

        self.storage
            .download_to_dir(&video_key, out)
            .await?
            .ok_or_else(|| {
                WorkerError::job_failed(format!("Source video disappeared: {video_key}"))
            })
    }
}

/// Map a variant's shot groups to the time spans fed to the synthesizer:
/// one span per group, from the group-start segment's start to the
/// group-end segment's end.
pub fn variant_spans(variant: &VideoVariant) -> WorkerResult<Vec<TimeSpan>> {
    let groups = group_consecutive_segments(&variant.segment_ids());
    groups
        .iter()
        .map(|group| {
            let start = variant.segment(&group.start_id).ok_or_else(|| {
                WorkerError::job_failed(format!("Unknown segment id: {}", group.start_id))
            })?;
            let end = variant.segment(&group.end_id).ok_or_else(|| {
                WorkerError::job_failed(format!("Unknown segment id: {}", group.end_id))
            })?;
            Ok(TimeSpan::new(start.start_s, end.end_s))
        })
        .collect()
}

/// Extension of a path including the leading dot, or empty.
fn file_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use advariant_models::{RenderSettings, Segment};

    #[test]
    fn test_variant_spans_one_per_group() {
        let variant = VideoVariant {
            variant_id: 1,
            segments: vec![
                Segment::new("1", 0.0, 2.0),
                Segment::new("2", 2.0, 5.0),
                Segment::new("7", 30.0, 33.0),
            ],
            title: "t".to_string(),
            description: "d".to_string(),
            score: 1.0,
            score_reasoning: "r".to_string(),
            render_settings: RenderSettings::default(),
        };

        let spans = variant_spans(&variant).unwrap();
        assert_eq!(spans, vec![TimeSpan::new(0.0, 5.0), TimeSpan::new(30.0, 33.0)]);
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension(Path::new("/tmp/input.mp4")), ".mp4");
        assert_eq!(file_extension(Path::new("/tmp/noext")), "");
    }
}
