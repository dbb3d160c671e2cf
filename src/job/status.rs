use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a job record.
///
/// The vocabulary is open: statuses this crate does not know about are kept
/// verbatim in [`JobStatus::Other`] so they survive a round trip untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    /// `new`: created, not yet submitted.
    New,
    /// `job-queued`: waiting for a worker.
    Queued,
    /// `job-started`: a worker has picked it up.
    Started,
    /// `job-completed`
    Completed,
    /// `job-failed`: set by the retry core when attempts run out.
    Failed,
    /// `job-offline`
    Offline,
    /// Any status string not listed above.
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::New => "new",
            JobStatus::Queued => "job-queued",
            JobStatus::Started => "job-started",
            JobStatus::Completed => "job-completed",
            JobStatus::Failed => "job-failed",
            JobStatus::Offline => "job-offline",
            JobStatus::Other(s) => s,
        }
    }

    /// Whether the job has reached a state it will not leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl From<String> for JobStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "new" => JobStatus::New,
            "job-queued" => JobStatus::Queued,
            "job-started" => JobStatus::Started,
            "job-completed" => JobStatus::Completed,
            "job-failed" => JobStatus::Failed,
            "job-offline" => JobStatus::Offline,
            _ => JobStatus::Other(value),
        }
    }
}

impl From<JobStatus> for String {
    fn from(value: JobStatus) -> Self {
        match value {
            JobStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_statuses_parse() {
        assert_eq!(JobStatus::from("job-failed".to_string()), JobStatus::Failed);
        assert_eq!(JobStatus::from("new".to_string()), JobStatus::New);
        assert_eq!(
            JobStatus::from("job-started".to_string()),
            JobStatus::Started
        );
    }

    #[test]
    fn unknown_status_is_preserved() {
        let status: JobStatus = serde_json::from_str(r#""ready-for-download""#).unwrap();
        assert_eq!(status, JobStatus::Other("ready-for-download".into()));
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            r#""ready-for-download""#
        );
    }

    #[test]
    fn failed_serializes_hyphenated() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Failed).unwrap(),
            r#""job-failed""#
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Started.is_terminal());
        assert!(!JobStatus::Other("weird".into()).is_terminal());
    }
}
