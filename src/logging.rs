//! Tracing setup and the job-scoped logger handed to handlers.

use std::fmt::Display;

use tracing::{Level, Span, debug, error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

use crate::config::Settings;
use crate::job::JobRecord;

/// Install the global tracing subscriber.
///
/// Production gets flattened JSON lines, development gets the pretty format.
/// `RUST_LOG` wins over the `log_level` parameter when set. Calling this more
/// than once is harmless.
pub fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(settings.log_level.into()));

    let result = if settings.environment.is_production() {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true),
            )
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .pretty(),
            )
            .with(filter)
            .try_init()
    };

    if result.is_ok() {
        debug!(environment = ?settings.environment, "Tracing initialized");
    }
}

/// Logger bound to one job; every event carries its `product_id` and `job_id`.
#[derive(Debug, Clone)]
pub struct JobLogger {
    product_id: String,
    job_id: String,
    span: Span,
}

impl JobLogger {
    pub fn for_job(job: &JobRecord) -> Self {
        let span = info_span!(
            "job",
            product_id = %job.product_id,
            job_id = %job.job_id_or_dash()
        );
        Self {
            product_id: job.product_id.clone(),
            job_id: job.job_id_or_dash().to_string(),
            span,
        }
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Span covering the job, for instrumenting handler-side work.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn log(&self, level: Level, message: impl Display) {
        let _entered = self.span.enter();
        let (product_id, job_id) = (self.product_id.as_str(), self.job_id.as_str());
        match level {
            Level::ERROR => error!(product_id, job_id, "{message}"),
            Level::WARN => warn!(product_id, job_id, "{message}"),
            Level::INFO => info!(product_id, job_id, "{message}"),
            _ => debug!(product_id, job_id, "{message}"),
        }
    }

    pub fn debug(&self, message: impl Display) {
        self.log(Level::DEBUG, message);
    }

    pub fn info(&self, message: impl Display) {
        self.log(Level::INFO, message);
    }

    pub fn warn(&self, message: impl Display) {
        self.log(Level::WARN, message);
    }

    pub fn error(&self, message: impl Display) {
        self.log(Level::ERROR, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_logger_carries_identity() {
        let job = JobRecord::new("p-1").with_job_id("j-1");
        let logger = JobLogger::for_job(&job);
        assert_eq!(logger.product_id(), "p-1");
        assert_eq!(logger.job_id(), "j-1");
        logger.info("processing granule");
    }

    #[test]
    fn job_logger_without_job_id() {
        let logger = JobLogger::for_job(&JobRecord::new("p-2"));
        assert_eq!(logger.job_id(), "-");
    }

    #[test]
    fn init_tracing_twice_is_harmless() {
        let settings = Settings::default();
        init_tracing(&settings);
        init_tracing(&settings);
    }
}
