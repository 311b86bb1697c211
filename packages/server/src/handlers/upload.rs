//! `POST /upload`: store a CSV file and enqueue its ingestion.

use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use bytes::Bytes;
use chrono::Utc;
use ingest_core::{PROCESS_CSV, UploadedFile};
use serde_json::{Value, json};
use storage::StorageError;

use crate::error::ApiError;
use crate::state::AppState;

/// Names tried before a collision is reported as a storage failure.
const MAX_NAME_ATTEMPTS: u32 = 16;

struct FilePart {
    original_name: String,
    data: Bytes,
}

/// Pull the single file sent under `field_name`.
async fn extract_file(multipart: &mut Multipart, field_name: &str) -> Result<FilePart, ApiError> {
    let mut found: Option<FilePart> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(field_name) {
            continue;
        }
        if found.is_some() {
            return Err(ApiError::BadRequest(format!(
                "Only one file may be sent as '{}'",
                field_name
            )));
        }

        let original_name = field.file_name().unwrap_or("upload.csv").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        found = Some(FilePart {
            original_name,
            data,
        });
    }

    found.ok_or(ApiError::MissingFile)
}

/// Write `data` under a fresh name, never replacing an existing upload.
async fn store_new(state: &AppState, original_name: &str, data: Bytes) -> Result<UploadedFile, ApiError> {
    let created_at = Utc::now();
    let mut last = None;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let file = UploadedFile::named(original_name, created_at, attempt);
        match state.uploads.put_new(&file.storage_path, data.clone()).await {
            Ok(()) => return Ok(file),
            Err(StorageError::AlreadyExists(name)) => {
                tracing::debug!("Upload name {} taken, retrying", name);
                last = Some(name);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(StorageError::AlreadyExists(last.unwrap_or_default()).into())
}

pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    state.uploads.ensure_root().await?;

    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let part = extract_file(&mut multipart, &state.upload_field).await?;
    let file = store_new(&state, &part.original_name, part.data).await?;
    tracing::info!(
        "Stored upload {} as {}",
        file.original_name,
        file.storage_path
    );

    let payload = serde_json::to_value(file.payload())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let job = match state.queue.enqueue(PROCESS_CSV, payload).await {
        Ok(job) => job,
        Err(e) => {
            if let Err(cleanup) = state.uploads.delete(&file.storage_path).await {
                tracing::warn!(
                    "Failed to remove {} after enqueue failure: {}",
                    file.storage_path,
                    cleanup
                );
            }
            return Err(e.into());
        }
    };

    tracing::info!(job_id = %job.id, "Job enqueued for {}", file.storage_path);

    Ok(Json(json!({
        "message": "File uploaded successfully and added to queue.",
        "filename": file.storage_path,
        "job_id": job.id,
    })))
}
