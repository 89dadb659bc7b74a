//! Scoped local staging directory.

use std::path::Path;

use chrono::Utc;
use tempfile::TempDir;

use crate::error::Result;

/// Temporary directory that holds downloads until they are uploaded.
///
/// Removed together with its contents when dropped.
#[derive(Debug)]
pub struct StagingDir {
    dir: TempDir,
}

impl StagingDir {
    /// Create a fresh directory named after the current UTC time.
    pub fn create() -> Result<Self> {
        let prefix = format!("tw_{}_", Utc::now().format("%Y-%m-%dT%H-%M-%SZ"));
        let dir = tempfile::Builder::new().prefix(&prefix).tempdir()?;
        log::debug!("Staging directory {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Like [`StagingDir::create`], but inside `parent`.
    pub fn create_in(parent: impl AsRef<Path>) -> Result<Self> {
        let prefix = format!("tw_{}_", Utc::now().format("%Y-%m-%dT%H-%M-%SZ"));
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(parent)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
