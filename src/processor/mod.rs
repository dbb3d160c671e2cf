//! The retry and dispatch core.
//!
//! [`HandlerRegistry`] binds one handler and yields an [`EntryPoint`], which
//! wraps a [`BatchDispatcher`]; the dispatcher runs records through a
//! [`RetryingJobProcessor`] (or hands the batch to a bulk handler).

mod dispatch;
mod handler;
mod registry;
mod retry;

pub use dispatch::{
    BatchDispatcher, BatchEvent, Envelope, InvocationContext, ProcessingMode, RECORDS_KEY,
};
pub use handler::{BulkHandler, BulkOutput, JobHandler};
pub use registry::{EntryPoint, HandlerRegistry};
pub use retry::{BackoffSchedule, RetryingJobProcessor, Sleeper, TokioSleeper};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::Sleeper;

    /// Records requested waits instead of sleeping.
    #[derive(Debug, Default)]
    pub struct RecordingSleeper {
        waits: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn waits(&self) -> Vec<Duration> {
            self.waits.lock().unwrap().clone()
        }

        pub fn waits_secs(&self) -> Vec<u64> {
            self.waits().iter().map(Duration::as_secs).collect()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.waits.lock().unwrap().push(duration);
        }
    }
}
