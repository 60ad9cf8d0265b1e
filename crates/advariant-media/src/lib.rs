//! FFmpeg CLI wrapper for variant rendering.
//!
//! This crate provides:
//! - Type-safe multi-input FFmpeg command building
//! - Filter-graph synthesis for the three variant audio strategies
//! - Blur-pad, crop and end-slate filter construction
//! - FFprobe wrappers for video/image metadata

pub mod command;
pub mod error;
pub mod filter_graph;
pub mod filters;
pub mod probe;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use filter_graph::{
    build_filter_programs, build_variant_command, resolve_overlay_start, FilterPrograms,
    TimeSpan, FADE_OUT_BUFFER_S, FADE_OUT_DURATION_S,
};
pub use filters::{
    crop_command_filter, end_slate_filter, parse_crop_dimensions, SQUARE_BLUR_FILTER,
    VERTICAL_BLUR_FILTER,
};
pub use probe::{probe_dimensions, probe_video, VideoInfo};
