//! The shared directory exposed to peers.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};

use crate::staging::StagingFile;
use crate::validation::validate_file_name;
use crate::{STAGING_DIR, StoreError};

/// A directory whose regular files are served to peers.
///
/// Every peer-supplied name goes through [`resolve`](Self::resolve) before
/// it touches the filesystem. Uploads are written under [`STAGING_DIR`] and
/// renamed into place, so the rename stays on one filesystem.
#[derive(Debug, Clone)]
pub struct SharedRoot {
    root: PathBuf,
}

impl SharedRoot {
    /// Opens (creating if needed) the shared directory.
    ///
    /// Leftover staging files from a previous run are removed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let root = tokio::fs::canonicalize(dir).await?;

        if !tokio::fs::metadata(&root).await?.is_dir() {
            return Err(StoreError::NotADirectory(root.display().to_string()));
        }

        let shared = Self { root };
        let swept = shared.sweep_staging().await?;
        if swept > 0 {
            tracing::info!(swept, root = %shared.root.display(), "removed stale staging files");
        }
        Ok(shared)
    }

    /// Canonical path of the shared directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Resolves a peer-supplied name to a path directly inside the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_file_name(name)?;
        Ok(self.root.join(name))
    }

    /// Size of the regular file at `path`, or `None` if there is none.
    pub async fn size(&self, path: &Path) -> Result<Option<u64>, StoreError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns `true` if a regular file exists at `path`.
    pub async fn exists(&self, path: &Path) -> Result<bool, StoreError> {
        Ok(self.size(path).await?.is_some())
    }

    /// Canonical target of `path` if it may be served: inside the root and
    /// outside the staging directory. `None` for missing or escaping entries.
    async fn served_target(&self, path: &Path) -> Result<Option<PathBuf>, StoreError> {
        let canonical = match tokio::fs::canonicalize(path).await {
            Ok(p) => p,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !canonical.starts_with(&self.root) || canonical.starts_with(self.staging_dir()) {
            tracing::debug!(path = %path.display(), "entry resolves outside shared root");
            return Ok(None);
        }
        Ok(Some(canonical))
    }

    /// Opens a regular file for reading, returning the handle and its size.
    ///
    /// The size comes from the open handle, so a concurrent rename over
    /// `path` cannot make it disagree with the bytes the handle yields.
    /// Symlinks are followed when their target stays inside the root.
    /// Returns `None` for missing entries, non-files, and symlinks that
    /// resolve outside the root.
    pub async fn open_file(&self, path: &Path) -> Result<Option<(File, u64)>, StoreError> {
        let Some(canonical) = self.served_target(path).await? else {
            return Ok(None);
        };

        let file = match File::open(&canonical).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Ok(None);
        }
        Ok(Some((file, meta.len())))
    }

    /// Lists the names [`open_file`](Self::open_file) would serve, sorted.
    ///
    /// Regular files and symlinks to regular files inside the root are
    /// listed. Directories (the staging directory included), escaping or
    /// dangling symlinks, and names that are not valid peer file names are
    /// skipped.
    pub async fn list_entries(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            let servable = if file_type.is_file() {
                true
            } else if file_type.is_symlink() {
                self.is_served_symlink(&entry.path()).await
            } else {
                false
            };
            if !servable {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if validate_file_name(&name).is_err() {
                continue;
            }
            names.push(name);
        }

        names.sort();
        Ok(names)
    }

    async fn is_served_symlink(&self, path: &Path) -> bool {
        match self.served_target(path).await {
            Ok(Some(target)) => tokio::fs::metadata(&target)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Creates a fresh, uniquely named staging file.
    pub async fn create_staging(&self) -> Result<StagingFile, StoreError> {
        let dir = self.staging_dir();
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("{}.part", uuid::Uuid::new_v4()));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok(StagingFile::new(path, file))
    }

    /// Atomically moves a completed staging file to `target`.
    ///
    /// Replaces any existing file at `target`. On failure the staging file
    /// is removed and `target` is untouched.
    pub async fn promote(
        &self,
        mut staging: StagingFile,
        target: &Path,
    ) -> Result<(), StoreError> {
        staging.finish().await?;
        tokio::fs::rename(staging.path(), target).await?;
        staging.disarm();
        Ok(())
    }

    /// Removes the file at `path`. Returns `false` if it did not exist.
    pub async fn remove_if_exists(&self, path: &Path) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes every file in the staging directory. Returns the count.
    pub async fn sweep_staging(&self) -> Result<usize, StoreError> {
        let mut entries = match tokio::fs::read_dir(self.staging_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if self.remove_if_exists(&entry.path()).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
