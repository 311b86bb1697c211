//! Standalone CSV ingestion worker.
//!
//! Claims `process_csv` jobs from the shared queue store and forwards the
//! parsed users to `DOWNSTREAM_URL`.

use std::sync::Arc;

use actors::{JobHandlerRegistry, QueueOptions, WorkQueue, WorkerPool, spawn_queue};
use anyhow::Context;
use db::DbConfig;
use ingest::CsvIngestHandler;
use ingest_core::{JobEvent, PipelineConfig};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PipelineConfig::from_env().context("Invalid configuration")?;
    if config.is_in_memory_store() {
        tracing::warn!("Queue store is in memory; this worker will only see jobs it enqueues itself");
    }

    let db = db::init(&DbConfig::from(&config.queue_store))
        .await
        .context("Failed to connect to queue store")?;

    let options = QueueOptions::new(config.queue_name.clone()).with_lease(config.job_lease);
    let (queue, queue_join) = spawn_queue(db, options)
        .await
        .context("Failed to start queue")?;

    let handler = CsvIngestHandler::from_config(&config).context("Failed to build CSV handler")?;
    tracing::info!(
        "Worker started for queue {} (uploads: {}, downstream: {}, mode: {})",
        queue.name(),
        config.upload_dir.display(),
        config.downstream_url,
        config.forward_mode.as_str()
    );

    let events = tokio::spawn(log_events(queue.subscribe()));

    let pool = WorkerPool::spawn(
        Arc::new(queue.clone()),
        JobHandlerRegistry::new().with(handler),
        config.worker_concurrency,
        "worker",
    )
    .await
    .context("Failed to start workers")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down gracefully...");

    pool.shutdown().await;
    queue.shutdown();
    if let Err(e) = queue_join.await {
        tracing::warn!("Queue actor ended abnormally: {}", e);
    }
    events.abort();

    tracing::info!("Worker stopped");
    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<JobEvent>) {
    loop {
        match events.recv().await {
            Ok(event) if event.is_terminal() => {
                tracing::info!(job_id = %event.job_id(), "{}", event.description());
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Skipped {} job events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
