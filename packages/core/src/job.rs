//! Job domain types for work items in the queue.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current status of a job in its lifecycle.
///
/// Transitions only move forward: `Waiting -> Active -> Completed | Failed`.
/// The single exception is [`JobStatus::release`], used when an active job's
/// lease expires and it has to be redelivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting to be claimed.
    #[default]
    Waiting,
    /// Job is claimed by exactly one worker.
    Active {
        started_at: DateTime<Utc>,
        worker_id: String,
        /// Stored as epoch millis so the store can compare it numerically.
        #[serde(with = "chrono::serde::ts_milliseconds")]
        lease_expires_at: DateTime<Utc>,
    },
    /// Job completed successfully.
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        result: JobResult,
    },
    /// Job failed with an error.
    Failed {
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        error: String,
    },
}

/// Error returned for a transition the lifecycle does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot move job from {from} to {to}")]
pub struct TransitionError {
    pub from: &'static str,
    pub to: &'static str,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Failed { .. })
    }

    /// Get a simple status string for display and queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active { .. } => "active",
            JobStatus::Completed { .. } => "completed",
            JobStatus::Failed { .. } => "failed",
        }
    }

    /// Build the `Active` status a claim moves a waiting job into.
    pub fn activate(&self, worker_id: &str, lease: Duration) -> Result<JobStatus, TransitionError> {
        match self {
            JobStatus::Waiting => {
                let now = Utc::now();
                Ok(JobStatus::Active {
                    started_at: now,
                    worker_id: worker_id.to_string(),
                    lease_expires_at: now + lease,
                })
            }
            other => Err(other.transition_to("active")),
        }
    }

    /// Build the `Completed` status for an active job.
    pub fn complete(&self, result: JobResult) -> Result<JobStatus, TransitionError> {
        match self {
            JobStatus::Active { started_at, .. } => Ok(JobStatus::Completed {
                started_at: *started_at,
                completed_at: Utc::now(),
                result,
            }),
            other => Err(other.transition_to("completed")),
        }
    }

    /// Build the `Failed` status for an active job.
    pub fn fail(&self, error: impl Into<String>) -> Result<JobStatus, TransitionError> {
        match self {
            JobStatus::Active { started_at, .. } => Ok(JobStatus::Failed {
                started_at: *started_at,
                failed_at: Utc::now(),
                error: error.into(),
            }),
            other => Err(other.transition_to("failed")),
        }
    }

    /// Put an active job back in line for redelivery.
    pub fn release(&self) -> Result<JobStatus, TransitionError> {
        match self {
            JobStatus::Active { .. } => Ok(JobStatus::Waiting),
            other => Err(other.transition_to("waiting")),
        }
    }

    /// Worker currently holding the job, if any.
    pub fn worker_id(&self) -> Option<&str> {
        match self {
            JobStatus::Active { worker_id, .. } => Some(worker_id),
            _ => None,
        }
    }

    fn transition_to(&self, to: &'static str) -> TransitionError {
        TransitionError {
            from: self.as_str(),
            to,
        }
    }
}

/// Result of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Human-readable summary of the result.
    pub summary: String,
    /// Optional structured output data as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl JobResult {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            output: None,
        }
    }

    pub fn with_output(summary: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            summary: summary.into(),
            output: Some(output),
        }
    }
}

/// A job represents a unit of queued work referencing one uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Name of the queue this job belongs to.
    pub queue: String,
    /// Type of job (used for routing to handlers).
    pub job_type: String,
    /// Job payload as JSON.
    pub payload: serde_json::Value,
    /// Current status.
    pub status: JobStatus,
    /// Number of times the job has been claimed.
    #[serde(default)]
    pub attempts: u32,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new waiting job.
    pub fn new(
        queue: impl Into<String>,
        job_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            queue: queue.into(),
            job_type: job_type.into(),
            payload,
            status: JobStatus::Waiting,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Decode the payload into a typed value.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}
