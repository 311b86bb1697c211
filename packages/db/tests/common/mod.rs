use db::{Database, DbConfig, DbError};

/// Fresh in-memory database with the schema applied.
///
/// Each call opens its own `mem://` engine, so tests do not share state.
pub async fn setup_db() -> Result<Database, DbError> {
    db::init(&DbConfig::memory()).await
}
