//! Local filesystem upload backend.
//!
//! Mirrors the remote layout under a root directory. Useful for development
//! and for runs that sync the archive elsewhere afterwards.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::storage::{FolderHandle, UploadTarget};

/// Local filesystem upload backend.
#[derive(Debug, Clone)]
pub struct LocalUploadTarget {
    root_dir: PathBuf,
}

impl LocalUploadTarget {
    /// Create a new target rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl UploadTarget for LocalUploadTarget {
    async fn ensure_folder(&self, path: &str) -> Result<FolderHandle> {
        let folder = FolderHandle::new(path);
        tokio::fs::create_dir_all(self.path(folder.path())).await?;
        Ok(folder)
    }

    /// Copy to a temp name first, then rename into place.
    async fn upload(&self, file: &Path, folder: &FolderHandle, remote_name: &str) -> Result<()> {
        let path = self.path(&folder.key(remote_name));
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        tokio::fs::copy(file, &tmp)
            .await
            .map_err(|e| AppError::upload(format!("{} -> {}: {}", file.display(), tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path).await?;

        log::info!("Uploaded \"{}\" to {}", remote_name, path.display());
        Ok(())
    }
}
