//! Worker actor for executing jobs.
//!
//! A worker runs one job at a time: it claims, runs the registered handler,
//! reports the outcome and then sends itself [`WorkerMessage::Next`].

use std::sync::Arc;
use std::time::Duration;

use ingest_core::Job;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio_util::sync::CancellationToken;

use crate::handler::JobHandlerRegistry;
use crate::messages::WorkerMessage;
use crate::queue::{QueueError, WorkQueue};

/// Pause after the queue reports an error before claiming again.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// State for the worker actor.
pub struct WorkerActorState {
    /// Unique worker ID.
    pub worker_id: String,
    queue: Arc<dyn WorkQueue>,
    handlers: Arc<JobHandlerRegistry>,
    shutdown: CancellationToken,
    claim_timeout: Option<Duration>,
    /// Jobs this worker has finished, successfully or not.
    pub processed: u64,
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub queue: Arc<dyn WorkQueue>,
    pub handlers: Arc<JobHandlerRegistry>,
    /// Cancelled to stop waiting for jobs; a running job is finished first.
    pub shutdown: CancellationToken,
    /// Bound on a single claim; `None` waits until a job or shutdown.
    pub claim_timeout: Option<Duration>,
}

impl WorkerActorState {
    async fn run(&mut self, job: Job) {
        let job_id = job.id;

        let outcome = match self.handlers.get(&job.job_type) {
            Some(handler) => {
                tracing::info!(
                    job_id = %job_id,
                    worker_id = %self.worker_id,
                    "Processing {} job (attempt {})",
                    job.job_type,
                    job.attempts
                );
                handler.handle(job).await
            }
            None => Err(format!("No handler for job type: {}", job.job_type)),
        };

        let reported = match outcome {
            Ok(result) => self.queue.complete(job_id, result).await,
            Err(error) => {
                tracing::warn!(job_id = %job_id, "Job handler failed: {}", error);
                self.queue.fail(job_id, &error).await
            }
        };

        if let Err(e) = reported {
            tracing::warn!(job_id = %job_id, "Failed to report job outcome: {}", e);
        }
        self.processed += 1;
    }
}

/// Worker actor that executes jobs.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker_id);

        myself.send_message(WorkerMessage::Next)?;

        Ok(WorkerActorState {
            worker_id: args.worker_id,
            queue: args.queue,
            handlers: args.handlers,
            shutdown: args.shutdown,
            claim_timeout: args.claim_timeout,
            processed: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Next => {
                if state.shutdown.is_cancelled() {
                    myself.stop(None);
                    return Ok(());
                }

                let claimed = tokio::select! {
                    _ = state.shutdown.cancelled() => {
                        myself.stop(None);
                        return Ok(());
                    }
                    claimed = state.queue.claim(&state.worker_id, state.claim_timeout) => claimed,
                };

                match claimed {
                    Ok(Some(job)) => state.run(job).await,
                    Ok(None) => {}
                    Err(QueueError::Closed) => {
                        tracing::info!("Queue closed, stopping worker: {}", state.worker_id);
                        myself.stop(None);
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::warn!("Worker {} failed to claim: {}", state.worker_id, e);
                        tokio::select! {
                            _ = state.shutdown.cancelled() => {}
                            _ = tokio::time::sleep(RETRY_DELAY) => {}
                        }
                    }
                }

                myself.send_message(WorkerMessage::Next)?;
            }

            WorkerMessage::Shutdown => {
                tracing::info!("Shutting down worker: {}", state.worker_id);
                myself.stop(None);
                return Ok(());
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!(
            "Worker {} stopped after {} job(s)",
            state.worker_id,
            state.processed
        );
        Ok(())
    }
}
