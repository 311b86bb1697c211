//! Client handle for a running queue actor.

use std::time::Duration;

use db::Database;
use db::repositories::JobRepository;
use ingest_core::{Job, JobEvent, JobId, JobResult, QueueStats};
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorRef, RpcReplyPort};
use tokio::sync::{broadcast, oneshot};

use crate::messages::QueueMessage;
use crate::queue::{QueueError, QueueFuture, WorkQueue};
use crate::queue_actor::{QueueActor, QueueArgs, QueueOptions};

/// Capacity of the job event channel.
const EVENT_CAPACITY: usize = 1024;

/// Cheap, cloneable access to one queue actor.
#[derive(Clone)]
pub struct QueueHandle {
    name: String,
    actor: ActorRef<QueueMessage>,
    events: broadcast::Sender<JobEvent>,
}

/// Spawn the actor for `options.name` backed by `db`.
///
/// Consumers reload waiting jobs and requeue expired leases before the
/// handle is returned.
pub async fn spawn_queue(
    db: Database,
    options: QueueOptions,
) -> Result<(QueueHandle, JoinHandle<()>), QueueError> {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let name = options.name.clone();
    let args = QueueArgs {
        options,
        repo: JobRepository::new(db),
        event_tx: events.clone(),
    };

    let (actor, join) = Actor::spawn(None, QueueActor, args)
        .await
        .map_err(|e| QueueError::Unavailable(format!("Failed to spawn queue: {}", e)))?;

    Ok((
        QueueHandle {
            name,
            actor,
            events,
        },
        join,
    ))
}

/// Receiving end of a parked claim.
///
/// A job that arrives after the claimer stopped waiting is sent back to the
/// queue instead of being lost with the channel.
struct ClaimSlot {
    rx: oneshot::Receiver<Job>,
    actor: ActorRef<QueueMessage>,
}

impl Drop for ClaimSlot {
    fn drop(&mut self) {
        self.rx.close();
        if let Ok(job) = self.rx.try_recv() {
            let _ = self
                .actor
                .send_message(QueueMessage::Release { job: Box::new(job) });
        }
    }
}

impl QueueHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying actor reference.
    pub fn actor(&self) -> &ActorRef<QueueMessage> {
        &self.actor
    }

    /// Stop the actor. Parked claims resolve with [`QueueError::Closed`].
    pub fn shutdown(&self) {
        let _ = self.actor.send_message(QueueMessage::Shutdown);
    }

    async fn call<T, F>(&self, build: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(RpcReplyPort<Result<T, QueueError>>) -> QueueMessage,
    {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.actor
            .send_message(build(tx.into()))
            .map_err(|e| QueueError::Unavailable(format!("Failed to send message: {}", e)))?;

        rx.await.map_err(|_| QueueError::Closed)?
    }
}

impl WorkQueue for QueueHandle {
    fn enqueue(&self, job_type: &str, payload: serde_json::Value) -> QueueFuture<'_, Job> {
        let job_type = job_type.to_string();
        Box::pin(async move {
            self.call(|reply| QueueMessage::Enqueue {
                job_type,
                payload,
                reply,
            })
            .await
        })
    }

    fn claim(&self, worker_id: &str, timeout: Option<Duration>) -> QueueFuture<'_, Option<Job>> {
        let worker_id = worker_id.to_string();
        Box::pin(async move {
            let (tx, rx) = oneshot::channel();
            self.actor
                .send_message(QueueMessage::Claim { worker_id, slot: tx })
                .map_err(|e| QueueError::Unavailable(format!("Failed to send message: {}", e)))?;

            let mut slot = ClaimSlot {
                rx,
                actor: self.actor.clone(),
            };

            match timeout {
                Some(limit) => match tokio::time::timeout(limit, &mut slot.rx).await {
                    Ok(Ok(job)) => Ok(Some(job)),
                    Ok(Err(_)) => Err(QueueError::Closed),
                    Err(_) => Ok(None),
                },
                None => match (&mut slot.rx).await {
                    Ok(job) => Ok(Some(job)),
                    Err(_) => Err(QueueError::Closed),
                },
            }
        })
    }

    fn complete(&self, job_id: JobId, result: JobResult) -> QueueFuture<'_, Job> {
        Box::pin(async move {
            self.call(|reply| QueueMessage::Complete {
                job_id,
                result,
                reply,
            })
            .await
        })
    }

    fn fail(&self, job_id: JobId, reason: &str) -> QueueFuture<'_, Job> {
        let error = reason.to_string();
        Box::pin(async move {
            self.call(|reply| QueueMessage::Fail {
                job_id,
                error,
                reply,
            })
            .await
        })
    }

    fn get(&self, job_id: JobId) -> QueueFuture<'_, Option<Job>> {
        Box::pin(async move { self.call(|reply| QueueMessage::GetJob { job_id, reply }).await })
    }

    fn stats(&self) -> QueueFuture<'_, QueueStats> {
        Box::pin(async move { self.call(|reply| QueueMessage::GetStats { reply }).await })
    }

    fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }
}
