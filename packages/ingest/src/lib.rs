//! CSV ingestion: turns a claimed `process_csv` job into forwarded user
//! records and a reported result.
//!
//! A job moves through `claimed -> streaming -> forwarded -> completed`, or
//! fails at the first stream-level error. Per-record delivery failures are
//! logged and counted without failing the job.

mod collector;
mod error;
mod forwarder;
mod handler;
mod parser;
mod path;

pub use collector::{
    Collector, DeliveryFuture, HttpCollector, IDEMPOTENCY_KEY, idempotency_key,
};
pub use error::{DeliveryError, IngestError};
pub use forwarder::{ForwardReport, forward};
pub use handler::{CsvIngestHandler, IngestSummary};
pub use parser::{ParsedUsers, parse_users};
pub use path::upload_key;
