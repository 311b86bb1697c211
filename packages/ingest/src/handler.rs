//! The `process_csv` job handler.

use std::sync::Arc;

use actors::{HandlerFuture, JobHandler};
use ingest_core::{
    FilePayload, ForwardMode, Job, JobId, JobResult, PROCESS_CSV, ParsedResult, PipelineConfig,
};
use serde_json::json;
use storage::{Storage, StorageConfig};

use crate::collector::{Collector, HttpCollector};
use crate::error::IngestError;
use crate::forwarder::{ForwardReport, forward};
use crate::parser::parse_users;
use crate::path::upload_key;

/// What one ingestion run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub job_id: JobId,
    pub filename: String,
    pub forwarded: ForwardReport,
    pub discarded: u64,
    /// Whether the progress endpoint accepted the result.
    pub reported: bool,
}

impl IngestSummary {
    pub fn to_job_result(&self) -> JobResult {
        JobResult::with_output(
            format!(
                "Parsed {} users from {} ({} discarded)",
                self.forwarded.delivered + self.forwarded.failed,
                self.filename,
                self.discarded
            ),
            json!({
                "filename": self.filename,
                "forwarded": self.forwarded.delivered,
                "failed": self.forwarded.failed,
                "discarded": self.discarded,
                "reported": self.reported,
            }),
        )
    }
}

/// Streams an uploaded CSV file, forwards its users and reports the result.
#[derive(Clone)]
pub struct CsvIngestHandler {
    uploads: Storage,
    collector: Arc<dyn Collector>,
    mode: ForwardMode,
}

impl CsvIngestHandler {
    pub fn new(uploads: Storage, collector: Arc<dyn Collector>, mode: ForwardMode) -> Self {
        Self {
            uploads,
            collector,
            mode,
        }
    }

    /// Handler reading `config.upload_dir` and posting to `config.downstream_url`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, IngestError> {
        let uploads = Storage::new(StorageConfig::filesystem(&config.upload_dir))?;
        let collector = HttpCollector::new(config.downstream_url.clone())?;
        Ok(Self::new(uploads, Arc::new(collector), config.forward_mode))
    }

    /// Run one job to completion.
    ///
    /// Nothing is forwarded unless the whole file parsed, so a stream error
    /// never leaves a job half delivered.
    pub async fn process(&self, job: &Job) -> Result<IngestSummary, IngestError> {
        let payload: FilePayload = job
            .payload_as()
            .map_err(|e| IngestError::InvalidPayload(e.to_string()))?;
        let key = upload_key(&payload.filename)?;

        tracing::info!(job_id = %job.id, "Processing CSV file: {}", key);
        let reader = self.uploads.open_reader(key).await?;
        let parsed = parse_users(reader).await?;

        tracing::info!(
            job_id = %job.id,
            "Parsed {} users ({} discarded). Sending to collector...",
            parsed.users.len(),
            parsed.discarded
        );
        let forwarded = forward(self.collector.as_ref(), self.mode, job.id, &parsed.users).await?;

        let result = ParsedResult::completed(job.id, parsed.users, parsed.discarded);
        let reported = match self.collector.report(&result).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(job_id = %job.id, "Failed to report parsed result: {}", e);
                false
            }
        };

        tracing::info!(
            job_id = %job.id,
            delivered = forwarded.delivered,
            failed = forwarded.failed,
            "CSV processing complete"
        );

        Ok(IngestSummary {
            job_id: job.id,
            filename: payload.filename,
            forwarded,
            discarded: result.discarded,
            reported,
        })
    }
}

impl JobHandler for CsvIngestHandler {
    fn job_type(&self) -> &str {
        PROCESS_CSV
    }

    fn handle(&self, job: Job) -> HandlerFuture {
        let handler = self.clone();
        Box::pin(async move {
            handler
                .process(&job)
                .await
                .map(|summary| summary.to_job_result())
                .map_err(|e| e.to_string())
        })
    }
}
