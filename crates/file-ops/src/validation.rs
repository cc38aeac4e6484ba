use std::path::{Component, Path};

use crate::{STAGING_DIR, StoreError};

/// Validates a peer-supplied file name.
///
/// The shared directory is flat, so a valid name is exactly one normal path
/// component. Rejects:
/// - Empty names, `.` and `..`
/// - Any `/` or `\` separator (absolute paths and traversal included)
/// - UNC paths, and on Windows any `:` (drive prefixes such as `C:` and
///   alternate data streams)
/// - NUL and other control characters (a `\n` would split a listing entry)
/// - The reserved staging directory name
pub fn validate_file_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidPath("empty file name".into()));
    }

    if name.contains(['/', '\\']) {
        return Err(StoreError::InvalidPath(format!(
            "path separators not allowed: {name:?}"
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(StoreError::InvalidPath(format!(
            "control characters not allowed: {name:?}"
        )));
    }

    #[cfg(windows)]
    if name.contains(':') {
        return Err(StoreError::InvalidPath(format!(
            "drive prefix or stream name not allowed: {name:?}"
        )));
    }

    if name == STAGING_DIR {
        return Err(StoreError::InvalidPath(format!("reserved name: {name:?}")));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(StoreError::InvalidPath(format!(
            "not a plain file name: {name:?}"
        ))),
    }
}
