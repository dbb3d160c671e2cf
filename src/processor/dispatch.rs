//! Batch decoding, per-record or bulk processing, and egress validation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::handler::{BulkHandler, JobHandler};
use super::retry::RetryingJobProcessor;
use crate::error::HardStop;
use crate::job::{JobRecord, JobSet};
use crate::schema::JobsetValidator;

/// Key under which queue-delivered batches carry their envelopes.
pub const RECORDS_KEY: &str = "Records";

/// One queue message carrying a serialized jobset fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Queue-assigned id, used only in logs.
    #[serde(rename = "messageId", default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// JSON text of a jobset.
    pub body: String,
}

impl Envelope {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            message_id: None,
            body: body.into(),
        }
    }
}

/// A raw event as delivered by the hosting runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// Queue mode: each entry should be an [`Envelope`]; entries are decoded
    /// one at a time so a bad one cannot sink the batch.
    Envelopes(Vec<Value>),
    /// Direct mode: the event is the jobset itself.
    Direct(Value),
}

impl BatchEvent {
    /// An object with a `Records` array is queue mode; anything else is direct.
    pub fn from_value(event: Value) -> Self {
        match event {
            Value::Object(mut map) if map.get(RECORDS_KEY).is_some_and(Value::is_array) => {
                match map.remove(RECORDS_KEY) {
                    Some(Value::Array(records)) => BatchEvent::Envelopes(records),
                    _ => BatchEvent::Envelopes(Vec::new()),
                }
            }
            other => BatchEvent::Direct(other),
        }
    }

    pub fn from_envelopes(envelopes: &[Envelope]) -> Self {
        BatchEvent::Envelopes(
            envelopes
                .iter()
                .filter_map(|e| serde_json::to_value(e).ok())
                .collect(),
        )
    }
}

/// Per-invocation data supplied by the hosting runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext {
    pub request_id: String,
    /// Wall-clock limit imposed by the host, if known.
    pub deadline: Option<DateTime<Utc>>,
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            deadline: None,
        }
    }
}

impl InvocationContext {
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// How records are handed to caller code.
#[derive(Debug, Clone)]
pub enum ProcessingMode {
    /// Each record independently, through the retrying processor.
    PerRecord(JobHandler),
    /// The whole ordered batch at once.
    Bulk(BulkHandler),
}

/// Maps a handler across a batch and validates both ends of the trip.
#[derive(Clone)]
pub struct BatchDispatcher {
    validator: Arc<dyn JobsetValidator>,
    processor: RetryingJobProcessor,
    mode: ProcessingMode,
}

impl std::fmt::Debug for BatchDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDispatcher")
            .field("processor", &self.processor)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl BatchDispatcher {
    pub fn new(
        validator: Arc<dyn JobsetValidator>,
        processor: RetryingJobProcessor,
        mode: ProcessingMode,
    ) -> Self {
        Self {
            validator,
            processor,
            mode,
        }
    }

    pub fn mode(&self) -> &ProcessingMode {
        &self.mode
    }

    /// Run one invocation end to end.
    ///
    /// Per-job failures come back as failed records inside the jobset. An
    /// `Err` means the invocation produced nothing usable.
    #[instrument(skip_all, fields(request_id = %ctx.request_id))]
    pub async fn dispatch(
        &self,
        event: BatchEvent,
        ctx: &InvocationContext,
    ) -> Result<JobSet, HardStop> {
        let input = self.decode(event)?;
        info!("Received {} jobs", input.len());

        let output = self.run(input, ctx).await?;
        self.validate_egress(output)
    }

    /// Extract job records from the event.
    ///
    /// In queue mode a malformed envelope is logged with its raw content and
    /// contributes nothing; the others still count.
    pub fn decode(&self, event: BatchEvent) -> Result<Vec<JobRecord>, HardStop> {
        match event {
            BatchEvent::Direct(raw) => match self.validator.validate(&raw) {
                Ok(set) => Ok(set.jobs),
                Err(e) => {
                    error!(error = %e, event = %raw, "Error validating input jobset");
                    Err(HardStop::IngressValidation)
                }
            },
            BatchEvent::Envelopes(records) => {
                debug!("Records received: {}", records.len());
                let mut jobs = Vec::new();
                for (index, record) in records.into_iter().enumerate() {
                    match self.decode_envelope(&record) {
                        Ok(set) => jobs.extend(set.jobs),
                        Err(reason) => {
                            error!(index, %reason, raw = %record, "Error validating input jobset");
                        }
                    }
                }
                Ok(jobs)
            }
        }
    }

    fn decode_envelope(&self, record: &Value) -> Result<JobSet, String> {
        let envelope: Envelope =
            serde_json::from_value(record.clone()).map_err(|e| format!("bad envelope: {e}"))?;
        let body: Value =
            serde_json::from_str(&envelope.body).map_err(|e| format!("unparsable body: {e}"))?;
        self.validator.validate(&body).map_err(|e| e.to_string())
    }

    async fn run(
        &self,
        jobs: Vec<JobRecord>,
        ctx: &InvocationContext,
    ) -> Result<Vec<JobRecord>, HardStop> {
        match &self.mode {
            ProcessingMode::PerRecord(handler) => {
                let mut output = Vec::with_capacity(jobs.len());
                for job in &jobs {
                    output.push(self.processor.process(job, handler, ctx.deadline).await);
                }
                Ok(output)
            }
            ProcessingMode::Bulk(handler) => run_bulk(handler, jobs),
        }
    }

    fn validate_egress(&self, jobs: Vec<JobRecord>) -> Result<JobSet, HardStop> {
        let raw = serde_json::to_value(JobSet::new(jobs)).map_err(|e| {
            error!(error = %e, "Error serializing output jobset");
            HardStop::EgressValidation
        })?;
        self.validator.validate(&raw).map_err(|e| {
            error!(error = %e, "Error validating output jobset");
            HardStop::EgressValidation
        })
    }
}

fn run_bulk(handler: &BulkHandler, jobs: Vec<JobRecord>) -> Result<Vec<JobRecord>, HardStop> {
    let mut expected: Vec<String> = jobs.iter().map(|j| j.product_id.clone()).collect();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler.call(jobs)));
    let output = match result {
        Ok(Ok(output)) => output.into_jobs(),
        Ok(Err(e)) => {
            error!("Bulk job handler failed: {e:?}");
            return Err(HardStop::BulkHandler);
        }
        Err(_) => {
            error!("Bulk job handler panicked");
            return Err(HardStop::BulkHandler);
        }
    };

    let mut actual: Vec<String> = output.iter().map(|j| j.product_id.clone()).collect();
    expected.sort();
    actual.sort();
    if expected != actual {
        error!(
            expected = expected.len(),
            returned = actual.len(),
            "Bulk job handler did not return each input product_id exactly once"
        );
        return Err(HardStop::BulkHandler);
    }
    Ok(output)
}
