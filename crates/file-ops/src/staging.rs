//! In-progress upload files.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::StoreError;

/// A temporary file receiving an upload.
///
/// Created by [`SharedRoot::create_staging`](crate::SharedRoot::create_staging)
/// and consumed by [`SharedRoot::promote`](crate::SharedRoot::promote).
/// A staging file that is dropped without being promoted is removed from
/// disk, so an aborted upload never leaves an artifact behind.
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
    file: Option<File>,
    written: u64,
    armed: bool,
}

impl StagingFile {
    pub(crate) fn new(path: PathBuf, file: File) -> Self {
        Self {
            path,
            file: Some(file),
            written: 0,
            armed: true,
        }
    }

    /// Path of the staging file (never the final path).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Appends a chunk of upload data.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<(), StoreError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StoreError::InvalidPath("staging file already closed".into()))?;
        file.write_all(data).await?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Flushes and closes the handle, leaving the file on disk.
    pub(crate) async fn finish(&mut self) -> Result<(), StoreError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    /// Marks the file as moved so drop no longer removes it.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }

    /// Removes the staging file now.
    pub async fn discard(mut self) -> Result<(), StoreError> {
        self.file.take();
        self.armed = false;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.armed {
            self.file.take();
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), "failed to remove staging file: {e}");
                }
            }
        }
    }
}
