//! Job records and the jobsets that carry them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::status::JobStatus;

/// Message appended to `errors` when a job exhausts its retries.
pub const FAILURE_MESSAGE: &str = "SDS pipeline failed";

/// Traceback recorded when the caller has no diagnostic text to give.
pub const MISSING_TRACEBACK: &str = "no diagnostic available";

/// A single unit of work exchanged with the transport.
///
/// Only the fields the retry core reads or writes are typed. Everything else
/// is kept in `extra` and passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Correlation key; identical on the way in and on the way out.
    pub product_id: String,
    /// Producer-assigned job identifier, used in log context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Lifecycle status; unknown values round-trip unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_status: Option<JobStatus>,
    /// Append-only; absent until the first error is recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    /// Diagnostic text from the last failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    /// Fields the core does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobRecord {
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            job_id: None,
            job_status: None,
            errors: None,
            traceback: None,
            extra: Map::new(),
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.job_status = Some(status);
        self
    }

    /// Job id for log fields, `-` when the producer did not set one.
    pub fn job_id_or_dash(&self) -> &str {
        self.job_id.as_deref().unwrap_or("-")
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.get_or_insert_with(Vec::new).push(message.into());
    }

    /// Build the terminal-failure record for this job.
    ///
    /// The result is derived from `self` (the original input), never from a
    /// handler's partial output. A blank `traceback` is replaced with
    /// [`MISSING_TRACEBACK`] so the record still reads as a terminal failure.
    pub fn to_terminal_failure(&self, traceback: impl Into<String>) -> Self {
        let mut traceback = traceback.into();
        if traceback.trim().is_empty() {
            traceback = MISSING_TRACEBACK.to_string();
        }
        let mut failed = self.clone();
        failed.job_status = Some(JobStatus::Failed);
        failed.traceback = Some(traceback);
        failed.push_error(FAILURE_MESSAGE);
        failed
    }

    pub fn is_terminal_failure(&self) -> bool {
        self.job_status == Some(JobStatus::Failed)
            && self.traceback.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// An ordered batch of job records under the `jobs` key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSet {
    pub jobs: Vec<JobRecord>,
}

impl JobSet {
    pub fn new(jobs: Vec<JobRecord>) -> Self {
        Self { jobs }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn product_ids(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|j| j.product_id.as_str())
    }

    pub fn failed_count(&self) -> usize {
        self.jobs.iter().filter(|j| j.is_terminal_failure()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extra_fields_pass_through() {
        let raw = json!({
            "product_id": "p-1",
            "job_id": "j-1",
            "job_status": "job-queued",
            "cycle": 7,
            "output_granule_extent_flag": true
        });
        let job: JobRecord = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(job.job_status, Some(JobStatus::Queued));
        assert_eq!(job.extra.get("cycle"), Some(&json!(7)));
        assert_eq!(serde_json::to_value(&job).unwrap(), raw);
    }

    #[test]
    fn errors_absent_until_first_push() {
        let mut job = JobRecord::new("p-1");
        assert!(job.errors.is_none());
        let json = serde_json::to_value(&job).unwrap();
        assert!(json.get("errors").is_none());

        job.push_error("first");
        job.push_error("second");
        assert_eq!(job.errors, Some(vec!["first".into(), "second".into()]));
    }

    #[test]
    fn terminal_failure_keeps_identity_and_appends() {
        let mut job = JobRecord::new("p-9").with_job_id("j-9");
        job.push_error("earlier problem");

        let failed = job.to_terminal_failure("boom\ncaused by: io");
        assert_eq!(failed.product_id, "p-9");
        assert_eq!(failed.job_id.as_deref(), Some("j-9"));
        assert_eq!(failed.job_status, Some(JobStatus::Failed));
        assert_eq!(failed.traceback.as_deref(), Some("boom\ncaused by: io"));
        assert_eq!(
            failed.errors,
            Some(vec!["earlier problem".into(), FAILURE_MESSAGE.into()])
        );
        assert!(failed.is_terminal_failure());
        assert!(!job.is_terminal_failure());
    }

    #[test]
    fn blank_traceback_is_replaced() {
        let failed = JobRecord::new("p-1").to_terminal_failure("  ");
        assert_eq!(failed.traceback.as_deref(), Some(MISSING_TRACEBACK));
        assert!(failed.is_terminal_failure());
    }

    #[test]
    fn jobset_counts_failures() {
        let ok = JobRecord::new("a").with_status(JobStatus::Completed);
        let bad = JobRecord::new("b").to_terminal_failure("trace");
        let set = JobSet::new(vec![ok, bad]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.failed_count(), 1);
        assert_eq!(set.product_ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
