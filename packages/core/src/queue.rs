//! Queue-level statistics.

use serde::{Deserialize, Serialize};

/// Job counts for a queue, grouped by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    /// Number of waiting jobs.
    pub waiting: u64,
    /// Number of active jobs.
    pub active: u64,
    /// Number of completed jobs.
    pub completed: u64,
    /// Number of failed jobs.
    pub failed: u64,
}
