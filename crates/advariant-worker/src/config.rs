//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Public base URL result asset URLs are built from
    /// (`<base>/<bucket>/<folder>/<file>`).
    pub public_base_url: String,
    /// Generative model name.
    pub gemini_model: String,
    /// Timeout for generative-model calls.
    pub gemini_timeout: Duration,
    /// Timeout for a single FFmpeg invocation.
    pub ffmpeg_timeout: Duration,
    /// Work directory for temporary files.
    pub work_dir: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            public_base_url: "https://storage.googleapis.com".to_string(),
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_timeout: Duration::from_secs(120),
            ffmpeg_timeout: Duration::from_secs(1800), // 30 minutes
            work_dir: "/tmp/advariant".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or(defaults.public_base_url),
            gemini_model: std::env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_timeout: Duration::from_secs(
                std::env::var("GEMINI_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            ffmpeg_timeout: Duration::from_secs(
                std::env::var("FFMPEG_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or(defaults.work_dir),
        }
    }
}
