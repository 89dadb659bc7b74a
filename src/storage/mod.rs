//! Upload destinations for archived posts.
//!
//! Every post is staged on local disk first, then each file is handed to an
//! [`UploadTarget`]. Two backends exist:
//!
//! ```text
//! local:  {local_dir}/{folder_prefix}/{account}/tw_info_*.json
//! s3:     s3://{bucket}/{prefix}/{folder_prefix}/{account}/tw_info_*.json
//! ```

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;
pub mod staging;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

// Re-export for convenience
pub use local::LocalUploadTarget;
#[cfg(feature = "s3")]
pub use s3::S3UploadTarget;
pub use staging::StagingDir;

/// Remote folder returned by [`UploadTarget::ensure_folder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderHandle {
    path: String,
}

impl FolderHandle {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: normalize_folder(path.as_ref()),
        }
    }

    /// Slash-separated path without leading or trailing slashes.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Key of `name` inside this folder.
    pub fn key(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.path, name)
        }
    }
}

impl fmt::Display for FolderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Trait for upload backends.
#[async_trait]
pub trait UploadTarget: Send + Sync {
    /// Create `path` if it does not exist yet.
    async fn ensure_folder(&self, path: &str) -> Result<FolderHandle>;

    /// Copy a local file into `folder` as `remote_name`.
    async fn upload(&self, file: &Path, folder: &FolderHandle, remote_name: &str) -> Result<()>;
}

/// Remote folder of one account.
pub fn account_folder(prefix: &str, account: &str) -> String {
    normalize_folder(&format!("{}/{}", prefix, account))
}

fn normalize_folder(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_folder() {
        assert_eq!(account_folder("tw", "someaccount"), "tw/someaccount");
        assert_eq!(account_folder("/archive/tw/", "someaccount"), "archive/tw/someaccount");
        assert_eq!(account_folder("", "someaccount"), "someaccount");
    }

    #[test]
    fn test_folder_handle_key() {
        let folder = FolderHandle::new("tw//someaccount/");
        assert_eq!(folder.path(), "tw/someaccount");
        assert_eq!(folder.key("tw_info_1.json"), "tw/someaccount/tw_info_1.json");
        assert_eq!(FolderHandle::new("").key("a.jpg"), "a.jpg");
    }
}
