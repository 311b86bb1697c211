//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// Every statement is `IF NOT EXISTS`, so this is safe to run from each
/// process that shares the store.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema.
///
/// Timestamps are kept as the strings chrono serializes; ordering uses the
/// ULID `job_id`, and lease expiry is stored as epoch millis.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMALESS;

DEFINE INDEX IF NOT EXISTS job_id ON job FIELDS job_id UNIQUE;
DEFINE INDEX IF NOT EXISTS job_queue ON job FIELDS queue;

-- Compound index for claim and recovery scans
DEFINE INDEX IF NOT EXISTS job_queue_state ON job FIELDS queue, status.state;
"#;
