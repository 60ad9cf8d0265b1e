//! Variant render worker.
//!
//! Each invocation handles exactly one trigger file:
//! - `render.json` — initial render: build shared cropped sources, fan out
//!   one per-variant trigger per variant
//! - `<id>-<total>_render.json` — render one variant
//! - `<total>-<total>_finalise_render.json` — merge all partial results
//! - `end_slate.json` — append an end slate to a finished batch
//!
//! Workers are stateless; the only coordination medium is the shared
//! storage listing (see `fanin`).

pub mod assets;
pub mod config;
pub mod end_slate;
pub mod error;
pub mod fanin;
pub mod gemini;
pub mod renderer;
pub mod trigger;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use renderer::RenderContext;
pub use trigger::{TriggerFile, TriggerKind};
