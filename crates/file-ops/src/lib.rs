//! File operations for the shared directory.
//!
//! Provides peer file-name validation, confined path resolution, listing,
//! and staged uploads that become visible only after an atomic rename.

mod root;
mod staging;
mod validation;

use std::path::PathBuf;

pub use root::SharedRoot;
pub use staging::StagingFile;
pub use validation::validate_file_name;

/// Hidden directory inside the shared root that holds in-progress uploads.
pub const STAGING_DIR: &str = ".fileshare-staging";

/// Errors produced by the file store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),
}

/// Expands a `~` prefix to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else if path == "~" {
        home_dir()
    } else {
        PathBuf::from(path)
    }
}

/// Returns the user's home directory.
fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
