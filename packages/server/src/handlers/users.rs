//! The downstream collector.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use ingest::IDEMPOTENCY_KEY;
use ingest_core::UserRecord;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

/// `Some(true)` for a fresh key, `Some(false)` for a repeat, `None` without one.
async fn check_key(state: &AppState, headers: &HeaderMap) -> Option<bool> {
    let key = headers.get(IDEMPOTENCY_KEY)?.to_str().ok()?;
    Some(state.seen.insert(key).await)
}

/// `POST /users`
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<UserRecord>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(user) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if check_key(&state, &headers).await == Some(false) {
        tracing::debug!("Duplicate user delivery: {}", user.email);
        return Ok(Json(json!({
            "message": "User already processed",
            "duplicate": true,
        })));
    }

    tracing::info!("Received user: {} <{}>", user.name, user.email);
    Ok(Json(json!({ "message": "User processed successfully" })))
}

/// `POST /users/batch`
pub async fn create_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Vec<UserRecord>>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(users) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if check_key(&state, &headers).await == Some(false) {
        tracing::debug!("Duplicate batch of {} users", users.len());
        return Ok(Json(json!({
            "message": "Users already processed",
            "duplicate": true,
        })));
    }

    for user in &users {
        tracing::info!("Received user: {} <{}>", user.name, user.email);
    }
    Ok(Json(json!({
        "message": "Users processed successfully",
        "count": users.len(),
    })))
}
