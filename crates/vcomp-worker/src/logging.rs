//! Tracing setup and structured job logging.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vcomp_models::JobId;

/// Directive applied when `RUST_LOG` is unset or invalid.
const DEFAULT_FILTER: &str = "vcomp=info";

/// Install the global subscriber.
///
/// `LOG_FORMAT=json` selects JSON lines; anything else the human format.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Consistent lifecycle lines for one job attempt.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    content_id: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, content_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            content_id: content_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            content_id = %self.content_id,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, step: &str, progress: u8) {
        info!(
            job_id = %self.job_id,
            content_id = %self.content_id,
            step = %step,
            progress,
            "Job progress"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            content_id = %self.content_id,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, step: &str, message: &str) {
        error!(
            job_id = %self.job_id,
            content_id = %self.content_id,
            step = %step,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            content_id = %self.content_id,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    /// Span wrapping the whole attempt.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            content_id = %self.content_id
        )
    }
}
