//! Structured logging.
//!
//! [`init_tracing`] installs the global subscriber; [`JobLogger`] gives
//! per-job lifecycle events tagged with the job and session IDs.

use pawsense_models::{JobFailure, PipelineJob};
use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the tracing subscriber.
///
/// `LOG_FORMAT=json` selects JSON lines; otherwise human-readable output.
/// `RUST_LOG` directives extend the built-in defaults. Logs go to stderr so
/// stdout stays clean for command output.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in ["pawsense=info", "ort=warn"] {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
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

/// Lifecycle events of one analysis job, tagged with its job and session.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    session_id: String,
    operation: &'static str,
}

impl JobLogger {
    pub fn for_job(job: &PipelineJob, operation: &'static str) -> Self {
        Self {
            job_id: job.id.to_string(),
            session_id: job.session_id.to_string(),
            operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = self.operation,
            "Analysis started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = self.operation,
            "Stage reached: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = self.operation,
            "Analysis warning: {}", message
        );
    }

    pub fn log_error(&self, failure: &JobFailure) {
        error!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = self.operation,
            kind = failure.kind.as_str(),
            branch = ?failure.branch,
            modality = ?failure.modality,
            "Analysis failed: {}", failure.message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = self.operation,
            "Analysis finished: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Span covering the whole run; branch and orchestrator events nest under it.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            session_id = %self.session_id,
            operation = self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_carries_ids() {
        let job = PipelineJob::new("dog.mp4", 30.0);
        let logger = JobLogger::for_job(&job, "analyze");

        assert_eq!(logger.job_id(), job.id.as_str());
        assert_eq!(logger.session_id(), job.session_id.as_str());
    }
}
