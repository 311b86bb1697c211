//! Result store endpoints.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

/// `POST /progress`: store a reported result verbatim.
pub async fn store(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    tracing::info!("Received parsed data: {}", payload);
    state.results.put(payload).await;
    Ok(Json(json!({ "message": "Parsed data stored" })))
}

/// `GET /progress`: the most recently reported result.
pub async fn latest(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .results
        .latest()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No parsed data available yet".to_string()))
}

/// `GET /progress/{job_id}`
pub async fn for_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .results
        .for_job(&job_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No parsed data for job {}", job_id)))
}
