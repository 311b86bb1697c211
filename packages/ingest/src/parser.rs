//! Streaming CSV parsing into user records.

use csv_async::{AsyncReaderBuilder, StringRecord};
use futures_util::StreamExt;
use ingest_core::UserRecord;
use tokio::io::AsyncRead;

use crate::error::IngestError;

/// Users extracted from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUsers {
    /// Valid rows, in file order.
    pub users: Vec<UserRecord>,
    /// Rows dropped for a missing `name` or `email`.
    pub discarded: u64,
}

impl ParsedUsers {
    /// Data rows seen, valid or not.
    pub fn rows(&self) -> u64 {
        self.users.len() as u64 + self.discarded
    }
}

/// Column positions of the fields we keep.
struct Columns {
    name: Option<usize>,
    email: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Self {
        let position = |field: &str| headers.iter().position(|h| h.trim() == field);
        Self {
            name: position("name"),
            email: position("email"),
        }
    }

    fn user(&self, record: &StringRecord) -> Option<UserRecord> {
        UserRecord::from_fields(
            self.name.and_then(|i| record.get(i)),
            self.email.and_then(|i| record.get(i)),
        )
    }
}

/// Parse a CSV stream row by row.
///
/// The first row names the fields. Rows may have any number of cells; a row
/// without a non-empty `name` and `email` is counted as discarded. Only the
/// accepted records are held in memory. Malformed input (such as invalid
/// UTF-8) fails the whole parse.
pub async fn parse_users<R>(reader: R) -> Result<ParsedUsers, IngestError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut csv = AsyncReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .create_reader(reader);

    let columns = Columns::from_headers(csv.headers().await?);
    if columns.name.is_none() || columns.email.is_none() {
        tracing::warn!("CSV header lacks a name or email column; every row will be discarded");
    }

    let mut parsed = ParsedUsers::default();
    let mut records = csv.records();
    while let Some(record) = records.next().await {
        let record = record?;
        match columns.user(&record) {
            Some(user) => {
                tracing::debug!("Parsed user {}", user.email);
                parsed.users.push(user);
            }
            None => {
                parsed.discarded += 1;
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                tracing::warn!(line, "Invalid row: {:?}", record);
            }
        }
    }

    Ok(parsed)
}
