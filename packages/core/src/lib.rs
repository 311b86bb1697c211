//! Core domain types for the CSV ingestion pipeline.
//!
//! This crate contains shared types used across all packages:
//! - Job and JobStatus for queued work
//! - Events broadcast by the work queue
//! - User records and parse results
//! - Pipeline configuration

mod config;
mod events;
mod job;
mod queue;
mod upload;
mod user;

pub use config::{ConfigError, ForwardMode, PipelineConfig, QueueStore};
pub use events::JobEvent;
pub use job::{Job, JobId, JobResult, JobStatus, TransitionError};
pub use queue::QueueStats;
pub use upload::{FilePayload, PROCESS_CSV, UploadedFile, sanitize_filename};
pub use user::{ParsedResult, ResultStatus, UserRecord};
