//! The work queue seam shared by producers and consumers.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use ingest_core::{Job, JobEvent, JobId, JobResult, QueueStats};
use tokio::sync::broadcast;

/// Future returned by [`WorkQueue`] operations.
pub type QueueFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, QueueError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The store or the queue actor cannot be reached.
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("job not found: {0}")]
    NotFound(JobId),

    /// The job is not held by a worker, so it cannot be finished this way.
    #[error("job {job_id} is {state}, not active")]
    NotActive { job_id: JobId, state: &'static str },

    /// The queue stopped while the caller was waiting.
    #[error("queue closed")]
    Closed,
}

/// A durable FIFO of jobs with exclusive claims.
///
/// Implemented by [`crate::QueueHandle`]; tests substitute their own doubles.
pub trait WorkQueue: Send + Sync + 'static {
    /// Persist a waiting job and return it once it is durable.
    fn enqueue(&self, job_type: &str, payload: serde_json::Value) -> QueueFuture<'_, Job>;

    /// Wait for a job and take it for `worker_id`.
    ///
    /// Resolves to `None` only when `timeout` elapses. Dropping the future
    /// gives up the claim; a job already handed over is put back.
    fn claim(&self, worker_id: &str, timeout: Option<Duration>) -> QueueFuture<'_, Option<Job>>;

    /// Mark an active job completed. Repeating it is a no-op.
    fn complete(&self, job_id: JobId, result: JobResult) -> QueueFuture<'_, Job>;

    /// Mark an active job failed. Repeating it is a no-op.
    fn fail(&self, job_id: JobId, reason: &str) -> QueueFuture<'_, Job>;

    fn get(&self, job_id: JobId) -> QueueFuture<'_, Option<Job>>;

    fn stats(&self) -> QueueFuture<'_, QueueStats>;

    /// Receive job lifecycle events from now on.
    fn subscribe(&self) -> broadcast::Receiver<JobEvent>;
}
