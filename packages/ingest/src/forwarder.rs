//! Forwarding parsed records to the collector.

use ingest_core::{ForwardMode, JobId, UserRecord};

use crate::collector::Collector;
use crate::error::DeliveryError;

/// Delivery counts for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardReport {
    pub delivered: u64,
    pub failed: u64,
}

/// Send `users` to the collector.
///
/// Per-record mode posts one record at a time in file order; a failed
/// record is logged and counted and the loop moves on, without retries.
/// Batch mode sends everything in one request and fails as a whole.
pub async fn forward(
    collector: &dyn Collector,
    mode: ForwardMode,
    job_id: JobId,
    users: &[UserRecord],
) -> Result<ForwardReport, DeliveryError> {
    match mode {
        ForwardMode::PerRecord => {
            let mut report = ForwardReport::default();
            for user in users {
                match collector.send_user(job_id, user).await {
                    Ok(()) => {
                        tracing::debug!(job_id = %job_id, "Sent: {}", user.email);
                        report.delivered += 1;
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, "Failed to send {}: {}", user.email, e);
                        report.failed += 1;
                    }
                }
            }
            Ok(report)
        }
        ForwardMode::Batch => {
            if users.is_empty() {
                return Ok(ForwardReport::default());
            }
            collector.send_batch(job_id, users).await?;
            tracing::debug!(job_id = %job_id, "Sent batch of {} users", users.len());
            Ok(ForwardReport {
                delivered: users.len() as u64,
                failed: 0,
            })
        }
    }
}
