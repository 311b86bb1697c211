//! Queue actor for a single named, durable queue.
//!
//! Every job lives in the `job` table; the actor only keeps the ids of
//! waiting jobs and the claimers parked on it. Claims are settled in the
//! store with a conditional update, so several processes can consume the
//! same queue without handing one job to two workers.

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use chrono::Utc;
use db::DbError;
use db::repositories::JobRepository;
use futures_util::StreamExt;
use ingest_core::{Job, JobEvent, JobId, JobResult, JobStatus, TransitionError};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

use crate::messages::QueueMessage;
use crate::queue::QueueError;

/// Upper bound on waiting jobs pulled from the store in one reload.
const RELOAD_LIMIT: usize = 1024;

/// How a queue actor behaves.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Queue name; jobs are scoped by it in the store.
    pub name: String,
    /// Whether this process claims jobs. Producer-only processes set `false`.
    pub consume: bool,
    /// How long a claimed job may stay active before it is redelivered.
    pub lease: Duration,
    /// Interval between housekeeping ticks.
    pub tick_interval: Duration,
}

impl QueueOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            consume: true,
            lease: Duration::from_secs(900),
            tick_interval: Duration::from_secs(5),
        }
    }

    /// Only enqueue; never claim.
    pub fn producer(mut self) -> Self {
        self.consume = false;
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

/// Arguments for spawning a [`QueueActor`].
pub struct QueueArgs {
    pub options: QueueOptions,
    pub repo: JobRepository,
    pub event_tx: broadcast::Sender<JobEvent>,
}

/// A claimer parked until a job is available.
struct Claimer {
    worker_id: String,
    slot: oneshot::Sender<Job>,
}

/// Terminal outcome reported by a worker.
enum Outcome {
    Completed(JobResult),
    Failed(String),
}

impl Outcome {
    fn apply(&self, status: &JobStatus) -> Result<JobStatus, TransitionError> {
        match self {
            Outcome::Completed(result) => status.complete(result.clone()),
            Outcome::Failed(error) => status.fail(error.clone()),
        }
    }

    /// Whether `status` already records this outcome.
    fn is_recorded(&self, status: &JobStatus) -> bool {
        matches!(
            (self, status),
            (Outcome::Completed(_), JobStatus::Completed { .. })
                | (Outcome::Failed(_), JobStatus::Failed { .. })
        )
    }
}

/// State for the queue actor.
pub struct QueueActorState {
    options: QueueOptions,
    lease: chrono::Duration,
    repo: JobRepository,
    /// Ids of jobs believed to be waiting, oldest first.
    pending: BTreeSet<JobId>,
    claimers: VecDeque<Claimer>,
    event_tx: broadcast::Sender<JobEvent>,
    /// Stops the tick and live-query tasks.
    background: CancellationToken,
}

fn unavailable(err: DbError) -> QueueError {
    QueueError::Unavailable(err.to_string())
}

impl QueueActorState {
    fn name(&self) -> &str {
        &self.options.name
    }

    fn broadcast(&self, event: JobEvent) {
        let _ = self.event_tx.send(event);
    }

    async fn load(&self, job_id: JobId) -> Result<Job, QueueError> {
        match self.repo.get(job_id).await {
            Ok(job) => Ok(job),
            Err(DbError::NotFound(_)) => Err(QueueError::NotFound(job_id)),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn enqueue(
        &mut self,
        job_type: String,
        payload: serde_json::Value,
    ) -> Result<Job, QueueError> {
        let job = Job::new(self.options.name.clone(), job_type, payload);
        let job = self.repo.create(&job).await.map_err(unavailable)?;

        tracing::info!(job_id = %job.id, queue = %job.queue, "Enqueued job {}", job.job_type);
        if self.options.consume {
            self.pending.insert(job.id);
        }
        self.broadcast(JobEvent::JobEnqueued {
            job: job.clone(),
            timestamp: Utc::now(),
        });

        Ok(job)
    }

    /// Next claimer that is still waiting.
    fn next_claimer(&mut self) -> Option<Claimer> {
        while let Some(claimer) = self.claimers.pop_front() {
            if !claimer.slot.is_closed() {
                return Some(claimer);
            }
            tracing::debug!("Dropping abandoned claim from {}", claimer.worker_id);
        }
        None
    }

    /// Hand waiting jobs to parked claimers until one side runs out.
    async fn dispatch(&mut self) {
        while !self.pending.is_empty() {
            let Some(claimer) = self.next_claimer() else {
                break;
            };
            let Some(job_id) = self.pending.pop_first() else {
                self.claimers.push_front(claimer);
                break;
            };

            let active = match JobStatus::Waiting.activate(&claimer.worker_id, self.lease) {
                Ok(status) => status,
                Err(e) => {
                    tracing::error!("Cannot build active status: {}", e);
                    self.claimers.push_front(claimer);
                    break;
                }
            };

            match self.repo.try_activate(job_id, &active).await {
                Ok(Some(job)) => self.hand_over(claimer, job).await,
                Ok(None) => {
                    // Claimed elsewhere or no longer waiting.
                    tracing::debug!(job_id = %job_id, "Job already taken");
                    self.claimers.push_front(claimer);
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, "Failed to claim job: {}", e);
                    self.pending.insert(job_id);
                    self.claimers.push_front(claimer);
                    break;
                }
            }
        }
    }

    async fn hand_over(&mut self, claimer: Claimer, job: Job) {
        let job_id = job.id;
        let attempt = job.attempts;

        match claimer.slot.send(job) {
            Ok(()) => {
                tracing::info!(
                    job_id = %job_id,
                    worker_id = %claimer.worker_id,
                    attempt,
                    "Job claimed"
                );
                self.broadcast(JobEvent::JobStarted {
                    job_id,
                    queue: self.options.name.clone(),
                    worker_id: claimer.worker_id,
                    attempt,
                    timestamp: Utc::now(),
                });
            }
            Err(job) => {
                tracing::debug!(job_id = %job_id, "Claimer left before the hand-over");
                self.release(job).await;
            }
        }
    }

    /// Put an active job that never reached its worker back in line.
    async fn release(&mut self, job: Job) {
        let (Some(worker_id), Ok(waiting)) = (job.status.worker_id(), job.status.release()) else {
            tracing::debug!(job_id = %job.id, "Released job is not active");
            return;
        };

        match self
            .repo
            .transition_active(job.id, worker_id, &waiting)
            .await
        {
            Ok(Some(_)) => {
                self.pending.insert(job.id);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(
                job_id = %job.id,
                "Failed to release job, it returns when its lease expires: {}",
                e
            ),
        }
    }

    async fn finish(&mut self, job_id: JobId, outcome: Outcome) -> Result<Job, QueueError> {
        let job = self.load(job_id).await?;

        if outcome.is_recorded(&job.status) {
            return Ok(job);
        }
        let Some(worker_id) = job.status.worker_id().map(str::to_string) else {
            return Err(QueueError::NotActive {
                job_id,
                state: job.status.as_str(),
            });
        };

        let next = outcome
            .apply(&job.status)
            .map_err(|e| QueueError::NotActive {
                job_id,
                state: e.from,
            })?;

        let Some(done) = self
            .repo
            .transition_active(job_id, &worker_id, &next)
            .await
            .map_err(unavailable)?
        else {
            // The job moved on between the read and the update.
            let current = self.load(job_id).await?;
            return if outcome.is_recorded(&current.status) {
                Ok(current)
            } else {
                Err(QueueError::NotActive {
                    job_id,
                    state: current.status.as_str(),
                })
            };
        };

        let now = Utc::now();
        match &done.status {
            JobStatus::Completed {
                started_at, result, ..
            } => {
                let duration_ms = (now - *started_at).num_milliseconds().max(0) as u64;
                tracing::info!(job_id = %job_id, duration_ms, "Job completed: {}", result.summary);
                self.broadcast(JobEvent::JobCompleted {
                    job_id,
                    queue: self.options.name.clone(),
                    duration_ms,
                    summary: result.summary.clone(),
                    timestamp: now,
                });
            }
            JobStatus::Failed { error, .. } => {
                tracing::warn!(job_id = %job_id, "Job failed: {}", error);
                self.broadcast(JobEvent::JobFailed {
                    job_id,
                    queue: self.options.name.clone(),
                    error: error.clone(),
                    timestamp: now,
                });
            }
            _ => {}
        }

        Ok(done)
    }

    /// Requeue expired leases and resync the waiting set with the store.
    async fn reconcile(&mut self) {
        match self.repo.requeue_expired(self.name(), Utc::now()).await {
            Ok(expired) => {
                for job in expired {
                    let previous_worker = job.status.worker_id().map(str::to_string);
                    tracing::warn!(
                        job_id = %job.id,
                        worker_id = ?previous_worker,
                        "Lease expired, job is waiting again"
                    );
                    self.broadcast(JobEvent::JobRequeued {
                        job_id: job.id,
                        queue: self.options.name.clone(),
                        previous_worker,
                        timestamp: Utc::now(),
                    });
                }
            }
            Err(e) => tracing::warn!("Failed to requeue expired jobs: {}", e),
        }

        match self.repo.list_waiting(self.name(), RELOAD_LIMIT).await {
            Ok(jobs) => {
                self.pending = jobs.into_iter().map(|job| job.id).collect();
            }
            Err(e) => tracing::warn!("Failed to reload waiting jobs: {}", e),
        }
    }
}

/// Forward waiting jobs written by any process to the actor.
async fn watch_store(myself: ActorRef<QueueMessage>, state: &QueueActorState) {
    let mut stream = match state.repo.watch_waiting(state.name()).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(
                "Live query unavailable for queue {}, relying on ticks: {}",
                state.name(),
                e
            );
            return;
        }
    };

    let stop = state.background.clone();
    tokio::spawn(async move {
        loop {
            let job = tokio::select! {
                _ = stop.cancelled() => break,
                job = stream.next() => job,
            };
            let Some(job) = job else {
                tracing::warn!("Live query on job table ended");
                break;
            };
            if myself
                .send_message(QueueMessage::Discovered { job: Box::new(job) })
                .is_err()
            {
                break;
            }
        }
    });
}

/// Queue actor that owns one named queue.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let QueueArgs {
            options,
            repo,
            event_tx,
        } = args;
        tracing::info!(
            "Starting queue actor: {} ({})",
            options.name,
            if options.consume { "consumer" } else { "producer" }
        );

        let lease = chrono::Duration::from_std(options.lease)
            .map_err(|e| ActorProcessingErr::from(format!("Invalid lease: {}", e)))?;
        let tick_interval = options.tick_interval;

        let mut state = QueueActorState {
            options,
            lease,
            repo,
            pending: BTreeSet::new(),
            claimers: VecDeque::new(),
            event_tx,
            background: CancellationToken::new(),
        };

        if state.options.consume {
            state.reconcile().await;
            tracing::info!(
                "Queue {} has {} waiting job(s)",
                state.name(),
                state.pending.len()
            );
            watch_store(myself.clone(), &state).await;

            let stop = state.background.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(tick_interval);
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = interval.tick() => {}
                    }
                    if myself.send_message(QueueMessage::Tick).is_err() {
                        break;
                    }
                }
            });
        }

        Ok(state)
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.background.cancel();
        state.claimers.clear();
        tracing::info!("Queue actor stopped: {}", state.name());
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Enqueue {
                job_type,
                payload,
                reply,
            } => {
                let result = state.enqueue(job_type, payload).await;
                if let Err(e) = &result {
                    tracing::warn!("Failed to enqueue job: {}", e);
                }
                let _ = reply.send(result);
                state.dispatch().await;
            }

            QueueMessage::Claim { worker_id, slot } => {
                if !state.options.consume {
                    tracing::warn!(
                        "Claim from {} on producer-only queue {}",
                        worker_id,
                        state.name()
                    );
                    return Ok(());
                }
                state.claimers.push_back(Claimer { worker_id, slot });
                state.dispatch().await;
            }

            QueueMessage::Release { job } => {
                state.release(*job).await;
                state.dispatch().await;
            }

            QueueMessage::Complete {
                job_id,
                result,
                reply,
            } => {
                let _ = reply.send(state.finish(job_id, Outcome::Completed(result)).await);
            }

            QueueMessage::Fail {
                job_id,
                error,
                reply,
            } => {
                let _ = reply.send(state.finish(job_id, Outcome::Failed(error)).await);
            }

            QueueMessage::GetJob { job_id, reply } => {
                let result = match state.load(job_id).await {
                    Ok(job) => Ok(Some(job)),
                    Err(QueueError::NotFound(_)) => Ok(None),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }

            QueueMessage::GetStats { reply } => {
                let stats = state
                    .repo
                    .get_queue_stats(state.name())
                    .await
                    .map_err(unavailable);
                let _ = reply.send(stats);
            }

            QueueMessage::Discovered { job } => {
                if state.options.consume
                    && job.queue == state.options.name
                    && matches!(job.status, JobStatus::Waiting)
                {
                    state.pending.insert(job.id);
                    state.dispatch().await;
                }
            }

            QueueMessage::Shutdown => {
                tracing::info!("Shutting down queue: {}", state.name());
                myself.stop(None);
                return Ok(());
            }

            QueueMessage::Tick => {
                state.claimers.retain(|c| !c.slot.is_closed());
                state.reconcile().await;
                state.dispatch().await;
            }
        }

        Ok(())
    }
}
