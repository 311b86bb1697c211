//! SurrealDB integration for the durable work queue.
//!
//! This crate provides database connectivity and the job repository the
//! queue actors persist through.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod schema;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, connect};
pub use schema::init_schema;

/// Connect with the given configuration and make sure the schema exists.
///
/// Called once per process at startup; the returned handle is cloned into
/// every component that needs the store.
pub async fn init(config: &DbConfig) -> Result<Database, DbError> {
    let db = connect(config).await?;
    init_schema(&db).await?;
    Ok(db)
}
