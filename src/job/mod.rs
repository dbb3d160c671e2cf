//! The job record data model.

mod record;
mod status;

pub use record::{FAILURE_MESSAGE, JobRecord, JobSet, MISSING_TRACEBACK};
pub use status::JobStatus;
