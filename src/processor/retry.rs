//! Per-job retry loop with quadratic backoff.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{error, info, warn};

use super::handler::JobHandler;
use crate::config::Settings;
use crate::job::JobRecord;
use crate::logging::JobLogger;

/// Waits out a backoff delay.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer. Nothing else in the batch moves meanwhile.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Quadratic backoff: attempt `i` is preceded by a wait of `i²` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    /// Number of retries; attempts run from `0` to `max_attempts` inclusive.
    pub max_attempts: u32,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl BackoffSchedule {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Initial attempt plus retries. Saturates at `u32::MAX`.
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }

    /// Wait before the given attempt index. Zero for attempt 0.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        Duration::from_secs(u64::from(attempt).pow(2))
    }

    /// Non-zero waits in the order they occur when every attempt fails.
    pub fn waits(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_attempts).map(|i| self.delay_before(i))
    }
}

/// Runs one job through a handler, retrying failures with quadratic backoff.
///
/// Each attempt gets its own clone of the input, so a failed attempt's
/// partial mutations never reach the next attempt or the result. When every
/// attempt fails, the result is the original input marked as a terminal
/// failure.
#[derive(Clone)]
pub struct RetryingJobProcessor {
    schedule: BackoffSchedule,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryingJobProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingJobProcessor")
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

impl RetryingJobProcessor {
    pub fn new(settings: &Settings) -> Self {
        Self::with_schedule(BackoffSchedule::new(settings.max_attempts))
    }

    pub fn with_schedule(schedule: BackoffSchedule) -> Self {
        Self {
            schedule,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn schedule(&self) -> BackoffSchedule {
        self.schedule
    }

    /// Process `job`, never failing: the result is either the handler's
    /// output or a terminal-failure record with the same `product_id`.
    ///
    /// With a `deadline`, retrying stops early when the next wait would end
    /// past it, and the terminal failure is returned instead.
    pub async fn process(
        &self,
        job: &JobRecord,
        handler: &JobHandler,
        deadline: Option<DateTime<Utc>>,
    ) -> JobRecord {
        let logger = handler.wants_logger().then(|| JobLogger::for_job(job));
        let mut last_failure = String::new();

        for attempt in 0..self.schedule.total_attempts() {
            let wait = self.schedule.delay_before(attempt);
            if !wait.is_zero() {
                if let Some(deadline) = deadline
                    && ends_after(wait, deadline)
                {
                    warn!(
                        product_id = %job.product_id,
                        job_id = job.job_id_or_dash(),
                        attempt,
                        "Backoff would pass the invocation deadline; giving up"
                    );
                    break;
                }
                info!(product_id = %job.product_id, "Backing off for {} seconds", wait.as_secs());
                self.sleeper.sleep(wait).await;
            }

            match run_attempt(handler, job, logger.as_ref()) {
                Ok(output) => return output,
                Err(trace) => {
                    error!(
                        product_id = %job.product_id,
                        job_id = job.job_id_or_dash(),
                        attempt,
                        max_attempts = self.schedule.max_attempts,
                        "Job handler attempt failed:\n{trace}"
                    );
                    last_failure = trace;
                }
            }
        }

        error!(
            product_id = %job.product_id,
            job_id = job.job_id_or_dash(),
            "Job failed after exhausting retries"
        );
        job.to_terminal_failure(last_failure)
    }
}

fn ends_after(wait: Duration, deadline: DateTime<Utc>) -> bool {
    let wait = TimeDelta::from_std(wait).unwrap_or(TimeDelta::MAX);
    Utc::now()
        .checked_add_signed(wait)
        .is_none_or(|end| end > deadline)
}

const EMPTY_ERROR_TRACE: &str = "handler returned an error with no message";

/// One attempt on a fresh clone of `job`. Errors come back as diagnostic text.
fn run_attempt(
    handler: &JobHandler,
    job: &JobRecord,
    logger: Option<&JobLogger>,
) -> Result<JobRecord, String> {
    let input = job.clone();
    let result = catch_unwind(AssertUnwindSafe(|| handler.call(input, logger)));
    match result {
        Ok(Ok(output)) if output.product_id == job.product_id => Ok(output),
        Ok(Ok(output)) => Err(format!(
            "handler changed product_id from `{}` to `{}`",
            job.product_id, output.product_id
        )),
        Ok(Err(e)) => {
            let trace = format!("{e:?}");
            if trace.trim().is_empty() {
                Err(EMPTY_ERROR_TRACE.to_string())
            } else {
                Err(trace)
            }
        }
        Err(payload) => Err(format!("handler panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
