//! HTTP process of the ingestion pipeline.
//!
//! Hosts the upload receiver, the result store behind `/progress`, the
//! downstream collector behind `/users` and read-only job inspection. It may
//! also run embedded workers against the same queue.

pub mod error;
pub mod handlers;
pub mod results;
pub mod seen;
pub mod state;

use std::sync::Arc;

use actors::concurrency::JoinHandle;
use actors::{JobHandlerRegistry, QueueHandle, QueueOptions, WorkerPool, spawn_queue};
use anyhow::Context;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use db::Database;
use ingest::CsvIngestHandler;
use ingest_core::PipelineConfig;
use storage::{Storage, StorageConfig};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use results::ResultStore;
pub use state::AppState;

use handlers::{jobs, progress, upload, users};

/// Body limit for JSON callbacks carrying a whole file's records.
///
/// Serialized records can be larger than the CSV they came from.
pub fn callback_body_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes.saturating_mul(4)
}

pub fn router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes;
    let callback_limit = callback_body_limit(upload_limit);

    let uploads = Router::new()
        .route("/upload", post(upload::upload))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(upload_limit));

    let callbacks = Router::new()
        .route("/progress", get(progress::latest).post(progress::store))
        .route("/users", post(users::create))
        .route("/users/batch", post(users::create_batch))
        .layer(DefaultBodyLimit::max(callback_limit));

    Router::new()
        .merge(uploads)
        .merge(callbacks)
        .route("/progress/{job_id}", get(progress::for_job))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/queue/stats", get(jobs::stats))
        .method_not_allowed_fallback(error::method_not_allowed)
        .fallback(error::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Everything the server process runs besides the listener.
pub struct Pipeline {
    pub router: Router,
    pub queue: QueueHandle,
    queue_join: JoinHandle<()>,
    workers: Option<WorkerPool>,
}

impl Pipeline {
    /// Spawn the queue (and embedded workers, if configured) and build the router.
    pub async fn start(config: &PipelineConfig, db: Database) -> anyhow::Result<Self> {
        let uploads = Storage::new(StorageConfig::filesystem(&config.upload_dir))
            .context("Failed to open upload directory")?;

        let mut options = QueueOptions::new(config.queue_name.clone()).with_lease(config.job_lease);
        if config.embedded_workers == 0 {
            if config.is_in_memory_store() {
                tracing::warn!(
                    "Queue store is in memory and EMBEDDED_WORKERS is 0; no process will run uploaded jobs"
                );
            }
            options = options.producer();
        }

        let (queue, queue_join) = spawn_queue(db, options)
            .await
            .context("Failed to start queue")?;

        let workers = if config.embedded_workers > 0 {
            let handlers = JobHandlerRegistry::new()
                .with(CsvIngestHandler::from_config(config).context("Failed to build CSV handler")?);
            let pool = WorkerPool::spawn(
                Arc::new(queue.clone()),
                handlers,
                config.embedded_workers,
                "server",
            )
            .await
            .context("Failed to start embedded workers")?;
            Some(pool)
        } else {
            None
        };

        let state = AppState::new(config, uploads, Arc::new(queue.clone()));

        Ok(Self {
            router: router(state),
            queue,
            queue_join,
            workers,
        })
    }

    /// Stop embedded workers, then the queue.
    pub async fn shutdown(self) {
        if let Some(workers) = self.workers {
            workers.shutdown().await;
        }
        self.queue.shutdown();
        if let Err(e) = self.queue_join.await {
            tracing::warn!("Queue actor ended abnormally: {}", e);
        }
    }
}
