//! Message types for actor communication.

use ingest_core::{Job, JobId, JobResult, QueueStats};
use ractor::RpcReplyPort;
use tokio::sync::oneshot;

use crate::queue::QueueError;

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Persist a new waiting job.
    Enqueue {
        job_type: String,
        payload: serde_json::Value,
        reply: RpcReplyPort<Result<Job, QueueError>>,
    },

    /// Park a claimer until a job can be handed to it.
    ///
    /// The claimer gives up by dropping the receiving half.
    Claim {
        worker_id: String,
        slot: oneshot::Sender<Job>,
    },

    /// A handed-over job whose claimer stopped waiting before taking it.
    Release { job: Box<Job> },

    /// Report job completion.
    Complete {
        job_id: JobId,
        result: JobResult,
        reply: RpcReplyPort<Result<Job, QueueError>>,
    },

    /// Report job failure.
    Fail {
        job_id: JobId,
        error: String,
        reply: RpcReplyPort<Result<Job, QueueError>>,
    },

    /// Get a job by ID.
    GetJob {
        job_id: JobId,
        reply: RpcReplyPort<Result<Option<Job>, QueueError>>,
    },

    /// Get queue stats.
    GetStats {
        reply: RpcReplyPort<Result<QueueStats, QueueError>>,
    },

    /// A job became waiting in the store, possibly written by another process.
    Discovered { job: Box<Job> },

    /// Shutdown the queue gracefully.
    Shutdown,

    /// Periodic tick for housekeeping.
    Tick,
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Claim the next job and run it.
    Next,

    /// Shutdown the worker.
    Shutdown,
}
