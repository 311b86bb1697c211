//! Upload path guard.

use std::path::{Component, Path};

use crate::error::IngestError;

/// Check that `filename` names a file directly inside the upload directory.
///
/// Only a single normal component is accepted: no separators, no `.` or
/// `..`, nothing absolute. The returned key is resolved by the worker
/// against its own upload directory.
pub fn upload_key(filename: &str) -> Result<&str, IngestError> {
    let invalid = |reason| IngestError::InvalidPath {
        filename: filename.to_string(),
        reason,
    };

    if filename.is_empty() {
        return Err(invalid("empty filename"));
    }
    if filename.contains(['/', '\\']) {
        return Err(invalid("path separators are not allowed"));
    }
    if filename.contains('\0') {
        return Err(invalid("NUL byte in filename"));
    }

    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(filename),
        _ => Err(invalid("not a plain file name")),
    }
}
