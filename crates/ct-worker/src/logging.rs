//! Tracing setup and per-job log lines.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ct_models::VideoId;

const DEFAULT_FILTER: &str = "ct_worker=info,ct_queue=info,info";

/// Install the global subscriber.
///
/// Human-readable output by default; one JSON object per line when
/// `LOG_FORMAT=json`. `RUST_LOG` replaces the default filter.
pub fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_current_span(true)).init();
    } else {
        registry
            .with(fmt::layer().with_ansi(true).with_target(true).compact())
            .init();
    }
}

/// Lifecycle lines for one video, all carrying `video_id` and `operation`.
#[derive(Debug, Clone)]
pub struct JobLogger {
    video_id: String,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(video_id: &VideoId, operation: &'static str) -> Self {
        Self {
            video_id: video_id.to_string(),
            operation,
        }
    }

    pub fn log_start(&self, detail: &str) {
        info!(video_id = %self.video_id, operation = self.operation, "{} started ({})", self.operation, detail);
    }

    pub fn log_progress(&self, detail: &str) {
        info!(video_id = %self.video_id, operation = self.operation, "{}", detail);
    }

    pub fn log_warning(&self, detail: &str) {
        warn!(video_id = %self.video_id, operation = self.operation, "{}", detail);
    }

    pub fn log_error(&self, detail: &str) {
        error!(video_id = %self.video_id, operation = self.operation, "{}", detail);
    }

    pub fn log_completion(&self, detail: &str) {
        info!(video_id = %self.video_id, operation = self.operation, "{} finished: {}", self.operation, detail);
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Span entered for the whole job, so recognizer and store logs carry the video id.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("transcription_job", video_id = %self.video_id, operation = self.operation)
    }
}
