//! Client side of the downstream collector and the progress endpoint.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use ingest_core::{JobId, ParsedResult, UserRecord};
use reqwest::Client;

use crate::error::DeliveryError;

/// Future returned by [`Collector`] calls.
pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>>;

/// Header carrying the per-record idempotency key.
pub const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Idempotency key for one record of one job.
///
/// A redelivered job produces the same keys, so the collector can drop
/// records it already accepted.
pub fn idempotency_key(job_id: JobId, user: &UserRecord) -> String {
    format!("{}:{}", job_id, user.email)
}

/// Where parsed records and results are sent.
pub trait Collector: Send + Sync + 'static {
    /// Deliver one record (`POST /users`).
    fn send_user<'a>(&'a self, job_id: JobId, user: &'a UserRecord) -> DeliveryFuture<'a>;

    /// Deliver every record of a job at once (`POST /users/batch`).
    fn send_batch<'a>(&'a self, job_id: JobId, users: &'a [UserRecord]) -> DeliveryFuture<'a>;

    /// Store a job's final result (`POST /progress`).
    fn report<'a>(&'a self, result: &'a ParsedResult) -> DeliveryFuture<'a>;
}

/// [`Collector`] speaking HTTP to the server process.
#[derive(Debug, Clone)]
pub struct HttpCollector {
    client: Client,
    base_url: String,
}

impl HttpCollector {
    /// Build a collector for `base_url` (for example `http://127.0.0.1:3000`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn check(response: reqwest::Response) -> Result<(), DeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(DeliveryError::Status {
        status: status.as_u16(),
        body,
    })
}

impl Collector for HttpCollector {
    fn send_user<'a>(&'a self, job_id: JobId, user: &'a UserRecord) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.url("/users"))
                .header(IDEMPOTENCY_KEY, idempotency_key(job_id, user))
                .json(user)
                .send()
                .await?;
            check(response).await
        })
    }

    fn send_batch<'a>(&'a self, job_id: JobId, users: &'a [UserRecord]) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.url("/users/batch"))
                .header(IDEMPOTENCY_KEY, job_id.to_string())
                .json(users)
                .send()
                .await?;
            check(response).await
        })
    }

    fn report<'a>(&'a self, result: &'a ParsedResult) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.url("/progress"))
                .json(result)
                .send()
                .await?;
            check(response).await
        })
    }
}
