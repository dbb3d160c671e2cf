//! One-shot handler registration and the runtime entry point.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{error, info};

use super::dispatch::{BatchDispatcher, BatchEvent, InvocationContext, ProcessingMode};
use super::handler::{BulkHandler, JobHandler};
use super::retry::{RetryingJobProcessor, Sleeper, TokioSleeper};
use crate::config::Settings;
use crate::error::JobsetError;
use crate::job::JobSet;
use crate::schema::{JobsetValidator, SchemaStore};

/// The adapted entry point consumed by the hosting runtime.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    dispatcher: BatchDispatcher,
}

impl EntryPoint {
    /// `(event, context) -> jobset | None`. `None` only for a hard stop;
    /// per-job failures are inside the returned jobset.
    pub async fn invoke(&self, event: Value, ctx: &InvocationContext) -> Option<JobSet> {
        match self.dispatcher.dispatch(BatchEvent::from_value(event), ctx).await {
            Ok(jobset) => Some(jobset),
            Err(stop) => {
                error!(request_id = %ctx.request_id, "Invocation produced no result: {stop}");
                None
            }
        }
    }
}

/// Binds exactly one processing function for the life of the process.
///
/// Created and owned by startup code. The first successful [`register`]
/// wins; later calls fail with [`JobsetError::RegistrationConflict`] and leave
/// the bound entry point untouched.
///
/// [`register`]: HandlerRegistry::register
pub struct HandlerRegistry {
    settings: Arc<Settings>,
    validator: Arc<dyn JobsetValidator>,
    sleeper: Arc<dyn Sleeper>,
    bound: OnceCell<EntryPoint>,
}

impl HandlerRegistry {
    pub fn new(settings: Arc<Settings>, validator: Arc<dyn JobsetValidator>) -> Self {
        Self {
            settings,
            validator,
            sleeper: Arc::new(TokioSleeper),
            bound: OnceCell::new(),
        }
    }

    /// Registry validating against the built-in `jobset` schema.
    pub fn with_builtin_schema(settings: Arc<Settings>) -> Result<Self, JobsetError> {
        let validator = SchemaStore::builtin()?.compile("jobset")?;
        Ok(Self::new(settings, Arc::new(validator)))
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn register(&self, mode: ProcessingMode) -> Result<EntryPoint, JobsetError> {
        if self.is_bound() {
            return Err(JobsetError::RegistrationConflict);
        }

        let processor =
            RetryingJobProcessor::new(&self.settings).with_sleeper(self.sleeper.clone());
        let kind = match &mode {
            ProcessingMode::PerRecord(h) if h.wants_logger() => "per-record (with job logger)",
            ProcessingMode::PerRecord(_) => "per-record",
            ProcessingMode::Bulk(_) => "bulk",
        };
        let entry = EntryPoint {
            dispatcher: BatchDispatcher::new(self.validator.clone(), processor, mode),
        };

        self.bound
            .set(entry.clone())
            .map_err(|_| JobsetError::RegistrationConflict)?;
        info!(
            mode = kind,
            max_attempts = self.settings.max_attempts,
            "Job handler registered"
        );
        Ok(entry)
    }

    pub fn register_job_handler(&self, handler: JobHandler) -> Result<EntryPoint, JobsetError> {
        self.register(ProcessingMode::PerRecord(handler))
    }

    pub fn register_bulk_handler(&self, handler: BulkHandler) -> Result<EntryPoint, JobsetError> {
        self.register(ProcessingMode::Bulk(handler))
    }

    pub fn is_bound(&self) -> bool {
        self.bound.get().is_some()
    }

    #[cfg(test)]
    fn entry_point(&self) -> Option<&EntryPoint> {
        self.bound.get()
    }
}
