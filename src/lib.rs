//! Retry and dispatch core for queue-triggered batch job processors.
//!
//! A hosting runtime delivers a batch of job records, either as a jobset or
//! as queue envelopes carrying jobset fragments. The registered handler runs
//! on every record with quadratic backoff retries, and the batch comes back
//! with the same `product_id`s, failed records included.
//!
//! ```ignore
//! let settings = Arc::new(Settings::load("my-service")?);
//! init_tracing(&settings);
//!
//! let registry = HandlerRegistry::with_builtin_schema(settings)?;
//! let entry = registry.register_job_handler(JobHandler::job_only(|job| {
//!     Ok(job.with_status(JobStatus::Completed))
//! }))?;
//!
//! let output = entry.invoke(event, &InvocationContext::default()).await;
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod processor;
pub mod schema;
pub mod sds;
pub mod services;

pub use config::{Environment, EnvParams, MapParams, ParamSource, Settings};
pub use error::{HardStop, JobsetError};
pub use job::{FAILURE_MESSAGE, JobRecord, JobSet, JobStatus, MISSING_TRACEBACK};
pub use logging::{JobLogger, init_tracing};
pub use processor::{
    BackoffSchedule, BatchDispatcher, BatchEvent, BulkHandler, BulkOutput, EntryPoint, Envelope,
    HandlerRegistry, InvocationContext, JobHandler, ProcessingMode, RetryingJobProcessor, Sleeper,
    TokioSleeper,
};
pub use schema::{JobsetValidator, SchemaError, SchemaKind, SchemaStore, Validator};
pub use services::Services;
