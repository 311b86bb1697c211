//! Job repository: the durable backing store of the work queue.

use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use ingest_core::{Job, JobId, JobStatus, QueueStats};
use serde::{Deserialize, Serialize};
use surrealdb::{Action, Notification, RecordId};

use crate::{Database, DbError};

/// Repository for job persistence operations.
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
}

/// Record type as stored in SurrealDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRecord {
    #[serde(default, skip_serializing)]
    id: Option<RecordId>,
    job_id: String,
    queue: String,
    job_type: String,
    payload: serde_json::Value,
    status: JobStatus,
    #[serde(default)]
    attempts: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRecord {
    fn from_job(job: &Job) -> Self {
        Self {
            id: None,
            job_id: job.id.to_string(),
            queue: job.queue.clone(),
            job_type: job.job_type.clone(),
            payload: job.payload.clone(),
            status: job.status.clone(),
            attempts: job.attempts,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }

    fn into_job(self) -> Result<Job, DbError> {
        let id = JobId::parse(&self.job_id)
            .map_err(|e| DbError::Serialization(format!("bad job id {}: {}", self.job_id, e)))?;
        Ok(Job {
            id,
            queue: self.queue,
            job_type: self.job_type,
            payload: self.payload,
            status: self.status,
            attempts: self.attempts,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn into_jobs(records: Vec<JobRecord>) -> Result<Vec<Job>, DbError> {
    records.into_iter().map(JobRecord::into_job).collect()
}

impl JobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new job in the database.
    pub async fn create(&self, job: &Job) -> Result<Job, DbError> {
        let record: Option<JobRecord> = self
            .db
            .create(("job", job.id.to_string()))
            .content(JobRecord::from_job(job))
            .await?;

        record
            .ok_or_else(|| DbError::Query("Failed to create job".into()))?
            .into_job()
    }

    /// Get a job by ID.
    pub async fn get(&self, id: JobId) -> Result<Job, DbError> {
        let record: Option<JobRecord> = self.db.select(("job", id.to_string())).await?;

        record
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))?
            .into_job()
    }

    /// Waiting jobs for a queue, oldest first.
    pub async fn list_waiting(&self, queue: &str, limit: usize) -> Result<Vec<Job>, DbError> {
        let mut result = self
            .db
            .query(
                r#"
                SELECT * FROM job
                WHERE queue = $queue AND status.state = "waiting"
                ORDER BY job_id ASC
                LIMIT $limit
                "#,
            )
            .bind(("queue", queue.to_string()))
            .bind(("limit", limit as i64))
            .await?;

        into_jobs(result.take(0)?)
    }

    /// Move a waiting job to `Active` for one worker.
    ///
    /// The update only applies while the stored job is still waiting, so two
    /// processes racing for the same job cannot both win. Returns `None` when
    /// the job was already taken or no longer exists.
    pub async fn try_activate(
        &self,
        id: JobId,
        active: &JobStatus,
    ) -> Result<Option<Job>, DbError> {
        let mut result = self
            .db
            .query(
                r#"
                UPDATE type::thing("job", $id)
                SET status = $status, attempts += 1, updated_at = $now
                WHERE status.state = "waiting"
                RETURN AFTER
                "#,
            )
            .bind(("id", id.to_string()))
            .bind(("status", active.clone()))
            .bind(("now", Utc::now()))
            .await?;

        let records: Vec<JobRecord> = result.take(0)?;
        records.into_iter().next().map(JobRecord::into_job).transpose()
    }

    /// Finish or release a job held by `worker_id`.
    ///
    /// Applies only while the stored job is still active for that worker.
    /// Returns `None` when the lease moved on.
    pub async fn transition_active(
        &self,
        id: JobId,
        worker_id: &str,
        status: &JobStatus,
    ) -> Result<Option<Job>, DbError> {
        let mut result = self
            .db
            .query(
                r#"
                UPDATE type::thing("job", $id)
                SET status = $status, updated_at = $now
                WHERE status.state = "active" AND status.worker_id = $worker
                RETURN AFTER
                "#,
            )
            .bind(("id", id.to_string()))
            .bind(("worker", worker_id.to_string()))
            .bind(("status", status.clone()))
            .bind(("now", Utc::now()))
            .await?;

        let records: Vec<JobRecord> = result.take(0)?;
        records.into_iter().next().map(JobRecord::into_job).transpose()
    }

    /// Put every active job whose lease ran out back to `Waiting`.
    ///
    /// Returns the jobs as they were before the update, so callers can tell
    /// which worker lost them.
    pub async fn requeue_expired(
        &self,
        queue: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, DbError> {
        let mut result = self
            .db
            .query(
                r#"
                UPDATE job
                SET status = $status, updated_at = $now
                WHERE queue = $queue
                    AND status.state = "active"
                    AND status.lease_expires_at <= $now_ms
                RETURN BEFORE
                "#,
            )
            .bind(("queue", queue.to_string()))
            .bind(("status", JobStatus::Waiting))
            .bind(("now", now))
            .bind(("now_ms", now.timestamp_millis()))
            .await?;

        into_jobs(result.take(0)?)
    }

    /// Count jobs by status for a queue.
    pub async fn count_by_status(
        &self,
        queue: &str,
    ) -> Result<std::collections::HashMap<String, u64>, DbError> {
        let mut result = self
            .db
            .query(
                r#"
                SELECT status.state AS state, count() AS count
                FROM job
                WHERE queue = $queue
                GROUP BY state
                "#,
            )
            .bind(("queue", queue.to_string()))
            .await?;

        #[derive(Deserialize)]
        struct StatusCount {
            state: Option<String>,
            count: i64,
        }

        let counts: Vec<StatusCount> = result.take(0)?;

        let mut map = std::collections::HashMap::new();
        for count in counts {
            if let Some(state) = count.state {
                map.insert(state, count.count.max(0) as u64);
            }
        }

        Ok(map)
    }

    /// Get queue statistics from job counts.
    pub async fn get_queue_stats(&self, queue: &str) -> Result<QueueStats, DbError> {
        let counts = self.count_by_status(queue).await?;

        Ok(QueueStats {
            waiting: counts.get("waiting").copied().unwrap_or(0),
            active: counts.get("active").copied().unwrap_or(0),
            completed: counts.get("completed").copied().unwrap_or(0),
            failed: counts.get("failed").copied().unwrap_or(0),
        })
    }

    /// Stream jobs of `queue` as they become waiting, whichever process
    /// created or released them.
    ///
    /// Backed by a SurrealDB live query. Items that fail to decode are
    /// logged and skipped.
    pub async fn watch_waiting(
        &self,
        queue: &str,
    ) -> Result<impl Stream<Item = Job> + Send + Unpin + 'static, DbError> {
        let stream: surrealdb::method::Stream<Vec<JobRecord>> =
            self.db.select("job").live().await?;
        let queue = queue.to_string();

        let jobs = stream.filter_map(move |item: surrealdb::Result<Notification<JobRecord>>| {
            let job = match item {
                Ok(notification) => match notification.action {
                    Action::Create | Action::Update => {
                        let record = notification.data;
                        if record.queue == queue && matches!(record.status, JobStatus::Waiting) {
                            match record.into_job() {
                                Ok(job) => Some(job),
                                Err(e) => {
                                    tracing::warn!("Skipping undecodable job notification: {}", e);
                                    None
                                }
                            }
                        } else {
                            None
                        }
                    }
                    _ => None,
                },
                Err(e) => {
                    tracing::warn!("Live query error on job table: {}", e);
                    None
                }
            };
            futures_util::future::ready(job)
        });

        Ok(Box::pin(jobs))
    }
}
