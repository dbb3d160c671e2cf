//! Caller-supplied processing functions.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::job::{JobRecord, JobSet};
use crate::logging::JobLogger;

pub type JobOnlyFn = dyn Fn(JobRecord) -> Result<JobRecord> + Send + Sync;
pub type JobWithLoggerFn = dyn Fn(JobRecord, &JobLogger) -> Result<JobRecord> + Send + Sync;
pub type BulkFn = dyn Fn(Vec<JobRecord>) -> Result<BulkOutput> + Send + Sync;

/// A per-record handler.
///
/// The variant decides whether a [`JobLogger`] is built and passed along; it
/// is fixed when the handler is constructed.
#[derive(Clone)]
pub enum JobHandler {
    /// Receives only the record.
    JobOnly(Arc<JobOnlyFn>),
    /// Receives the record and a logger scoped to it.
    WithLogger(Arc<JobWithLoggerFn>),
}

impl JobHandler {
    pub fn job_only<F>(f: F) -> Self
    where
        F: Fn(JobRecord) -> Result<JobRecord> + Send + Sync + 'static,
    {
        JobHandler::JobOnly(Arc::new(f))
    }

    pub fn with_logger<F>(f: F) -> Self
    where
        F: Fn(JobRecord, &JobLogger) -> Result<JobRecord> + Send + Sync + 'static,
    {
        JobHandler::WithLogger(Arc::new(f))
    }

    pub fn wants_logger(&self) -> bool {
        matches!(self, JobHandler::WithLogger(_))
    }

    pub(crate) fn call(&self, job: JobRecord, logger: Option<&JobLogger>) -> Result<JobRecord> {
        match (self, logger) {
            (JobHandler::JobOnly(f), _) => f(job),
            (JobHandler::WithLogger(f), Some(logger)) => f(job, logger),
            (JobHandler::WithLogger(f), None) => {
                let logger = JobLogger::for_job(&job);
                f(job, &logger)
            }
        }
    }
}

impl fmt::Debug for JobHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobHandler::JobOnly(_) => write!(f, "JobHandler::JobOnly"),
            JobHandler::WithLogger(_) => write!(f, "JobHandler::WithLogger"),
        }
    }
}

/// What a bulk handler hands back: bare records, or a jobset it built itself.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOutput {
    /// Records in any order; each input `product_id` exactly once.
    Jobs(Vec<JobRecord>),
    /// A complete jobset, with the same identity rule as `Jobs`.
    JobSet(JobSet),
}

impl BulkOutput {
    pub fn into_jobs(self) -> Vec<JobRecord> {
        match self {
            BulkOutput::Jobs(jobs) => jobs,
            BulkOutput::JobSet(set) => set.jobs,
        }
    }
}

/// A handler that owns the whole batch.
#[derive(Clone)]
pub struct BulkHandler(Arc<BulkFn>);

impl BulkHandler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Vec<JobRecord>) -> Result<BulkOutput> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn call(&self, jobs: Vec<JobRecord>) -> Result<BulkOutput> {
        (self.0)(jobs)
    }
}

impl fmt::Debug for BulkHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BulkHandler")
    }
}
