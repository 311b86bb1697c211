//! Job inspection.

use axum::Json;
use axum::extract::{Path, State};
use ingest_core::{Job, JobId, QueueStats};

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /jobs/{id}`
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job_id = JobId::parse(&id).map_err(|_| ApiError::BadRequest(format!("Invalid job id: {}", id)))?;
    state
        .queue
        .get(job_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", job_id)))
}

/// `GET /queue/stats`
pub async fn stats(State(state): State<AppState>) -> Result<Json<QueueStats>, ApiError> {
    Ok(Json(state.queue.stats().await?))
}
