//! Errors raised while ingesting one uploaded file.

use storage::StorageError;

/// Reasons a CSV ingestion job fails.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The job payload is not a `{filename}` object.
    #[error("invalid job payload: {0}")]
    InvalidPayload(String),

    /// The filename would resolve outside the upload directory.
    #[error("invalid upload path {filename:?}: {reason}")]
    InvalidPath { filename: String, reason: &'static str },

    /// The file is malformed or could not be read to the end.
    #[error("CSV stream error: {0}")]
    Stream(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Batch forwarding failed as a whole.
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

impl From<csv_async::Error> for IngestError {
    fn from(err: csv_async::Error) -> Self {
        IngestError::Stream(err.to_string())
    }
}

/// Failure to hand records or results to the collector.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("collector answered {status}: {body}")]
    Status { status: u16, body: String },
}
