//! Shared data models for the AdVariant render backend.
//!
//! This crate provides Serde-serializable types for:
//! - A/V segments and their hierarchical identifiers
//! - Video variants and per-variant render settings
//! - Rendered combination output records
//! - Contiguous segment grouping (shot groups)
//! - The persisted file-naming protocol

pub mod combo;
pub mod grouping;
pub mod naming;
pub mod segment;
pub mod variant;

// Re-export common types
pub use combo::{FormatOutput, RenderedCombo, TextAsset};
pub use grouping::{group_consecutive_segments, ShotGroup};
pub use segment::{Segment, SegmentId};
pub use variant::{AudioStrategy, OverlayAnchor, RenderFormat, RenderSettings, VideoVariant};
