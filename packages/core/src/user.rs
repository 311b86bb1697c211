//! User records extracted from uploaded files.

use serde::{Deserialize, Serialize};

use crate::JobId;

/// One validated row of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub email: String,
}

impl UserRecord {
    /// Build a record from raw cell values.
    ///
    /// Returns `None` unless both fields are non-empty after trimming.
    pub fn from_fields(name: Option<&str>, email: Option<&str>) -> Option<Self> {
        let name = name.map(str::trim).filter(|s| !s.is_empty())?;
        let email = email.map(str::trim).filter(|s| !s.is_empty())?;
        Some(Self {
            name: name.to_string(),
            email: email.to_string(),
        })
    }
}

/// Whether a parse result is final.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    #[default]
    Pending,
    Completed,
}

/// Outcome of parsing one uploaded file, as reported to the progress endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub status: ResultStatus,
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub discarded: u64,
}

impl ParsedResult {
    pub fn completed(job_id: JobId, users: Vec<UserRecord>, discarded: u64) -> Self {
        Self {
            job_id: Some(job_id),
            status: ResultStatus::Completed,
            users,
            discarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_fields() {
        assert!(UserRecord::from_fields(Some(""), Some("bob@x.com")).is_none());
        assert!(UserRecord::from_fields(Some("Bob"), Some("   ")).is_none());
        assert!(UserRecord::from_fields(None, Some("bob@x.com")).is_none());

        let alice = UserRecord::from_fields(Some(" Alice "), Some("alice@x.com"));
        assert_eq!(
            alice,
            Some(UserRecord {
                name: "Alice".into(),
                email: "alice@x.com".into(),
            })
        );
    }

    #[test]
    fn completed_result_shape() {
        let result = ParsedResult::completed(
            JobId::new(),
            vec![UserRecord {
                name: "Alice".into(),
                email: "alice@x.com".into(),
            }],
            1,
        );
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["status"], "completed");
        assert_eq!(value["users"][0]["name"], "Alice");
        assert_eq!(value["discarded"], 1);
    }
}
