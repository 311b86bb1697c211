//! A fixed set of worker actors sharing one queue.

use std::sync::Arc;
use std::time::Duration;

use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorRef, SpawnErr};
use tokio_util::sync::CancellationToken;

use crate::handler::JobHandlerRegistry;
use crate::messages::WorkerMessage;
use crate::queue::WorkQueue;
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// Worker id unique across processes sharing a store: `<prefix>-<pid>-<n>`.
pub fn worker_id(prefix: &str, index: usize) -> String {
    format!("{}-{}-{}", prefix, std::process::id(), index)
}

/// Workers spawned by [`WorkerPool::spawn`].
pub struct WorkerPool {
    workers: Vec<(ActorRef<WorkerMessage>, JoinHandle<()>)>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawn `concurrency` workers, each running one job at a time.
    pub async fn spawn(
        queue: Arc<dyn WorkQueue>,
        handlers: JobHandlerRegistry,
        concurrency: usize,
        id_prefix: &str,
    ) -> Result<Self, SpawnErr> {
        Self::spawn_with_timeout(queue, handlers, concurrency, id_prefix, None).await
    }

    /// Like [`spawn`](Self::spawn), bounding every claim by `claim_timeout`.
    pub async fn spawn_with_timeout(
        queue: Arc<dyn WorkQueue>,
        handlers: JobHandlerRegistry,
        concurrency: usize,
        id_prefix: &str,
        claim_timeout: Option<Duration>,
    ) -> Result<Self, SpawnErr> {
        let handlers = Arc::new(handlers);
        let shutdown = CancellationToken::new();
        let mut workers = Vec::with_capacity(concurrency);

        for index in 1..=concurrency {
            let args = WorkerArgs {
                worker_id: worker_id(id_prefix, index),
                queue: queue.clone(),
                handlers: handlers.clone(),
                shutdown: shutdown.child_token(),
                claim_timeout,
            };

            match Actor::spawn(None, WorkerActor, args).await {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    shutdown.cancel();
                    return Err(e);
                }
            }
        }

        tracing::info!("Started {} worker(s)", workers.len());

        Ok(Self { workers, shutdown })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Stop claiming, let running jobs finish and wait for every worker.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for (actor, handle) in self.workers {
            if let Err(e) = handle.await {
                tracing::warn!("Worker {:?} ended abnormally: {}", actor.get_id(), e);
            }
        }
        tracing::info!("Worker pool stopped");
    }
}
