//! Shared handler state.

use std::sync::Arc;

use actors::WorkQueue;
use ingest_core::PipelineConfig;
use storage::Storage;

use crate::results::ResultStore;
use crate::seen::SeenKeys;

/// Idempotency keys remembered by the collector.
const SEEN_KEY_CAPACITY: usize = 10_000;

#[derive(Clone)]
pub struct AppState {
    pub uploads: Storage,
    pub queue: Arc<dyn WorkQueue>,
    pub results: Arc<ResultStore>,
    pub seen: Arc<SeenKeys>,
    pub upload_field: String,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: &PipelineConfig, uploads: Storage, queue: Arc<dyn WorkQueue>) -> Self {
        Self {
            uploads,
            queue,
            results: Arc::new(ResultStore::new(config.result_history)),
            seen: Arc::new(SeenKeys::new(SEEN_KEY_CAPACITY)),
            upload_field: config.upload_field.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}
