//! Uploaded file references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job type routed to the CSV ingestion handler.
pub const PROCESS_CSV: &str = "process_csv";

/// Payload carried by a CSV ingestion job.
///
/// Only the stored file name travels through the queue; each process resolves
/// it against its own upload directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub filename: String,
}

/// A file written by the upload receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Name under the upload directory.
    pub storage_path: String,
    /// Name supplied by the client.
    pub original_name: String,
    pub created_at: DateTime<Utc>,
}

impl UploadedFile {
    /// Describe a new upload, naming it `<unix-millis>-<original>`.
    ///
    /// `attempt` disambiguates a name that is already taken.
    pub fn named(original_name: &str, created_at: DateTime<Utc>, attempt: u32) -> Self {
        let safe = sanitize_filename(original_name);
        let storage_path = if attempt == 0 {
            format!("{}-{}", created_at.timestamp_millis(), safe)
        } else {
            format!("{}-{}-{}", created_at.timestamp_millis(), attempt, safe)
        };
        Self {
            storage_path,
            original_name: original_name.to_string(),
            created_at,
        }
    }

    pub fn payload(&self) -> FilePayload {
        FilePayload {
            filename: self.storage_path.clone(),
        }
    }
}

/// Reduce a client-supplied name to a single safe path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload.csv".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stored_name_is_timestamp_prefixed() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let file = UploadedFile::named("users.csv", at, 0);
        assert_eq!(file.storage_path, "1700000000123-users.csv");
        assert_eq!(file.payload().filename, "1700000000123-users.csv");

        let retry = UploadedFile::named("users.csv", at, 2);
        assert_eq!(retry.storage_path, "1700000000123-2-users.csv");
    }

    #[test]
    fn sanitize_strips_directories_and_odd_chars() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\tmp\\my users.csv"), "my_users.csv");
        assert_eq!(sanitize_filename(".."), "upload.csv");
        assert_eq!(sanitize_filename(""), "upload.csv");
        assert_eq!(sanitize_filename(".hidden.csv"), "hidden.csv");
    }
}
