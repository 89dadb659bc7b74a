//! AWS S3 upload backend.
//!
//! Folders are zero-byte `{key}/` marker objects so the account folder shows
//! up in consoles before the first file lands.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::{AppError, Result};
use crate::models::UploadConfig;
use crate::storage::{FolderHandle, UploadTarget};

/// S3-based upload target.
pub struct S3UploadTarget {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3UploadTarget {
    /// Create a new S3 upload target.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Create the target from the environment.
    ///
    /// Credentials come from the usual AWS sources. `S3_BUCKET` and
    /// `S3_PREFIX` win over the `[upload]` section.
    pub async fn from_env(upload: &UploadConfig) -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = Client::new(&config);

        let bucket = std::env::var("S3_BUCKET")
            .ok()
            .or_else(|| upload.s3_bucket.clone())
            .ok_or_else(|| AppError::config("S3 bucket missing: set S3_BUCKET or upload.s3_bucket"))?;
        let prefix = std::env::var("S3_PREFIX")
            .ok()
            .or_else(|| upload.s3_prefix.clone())
            .unwrap_or_default();

        Ok(Self::new(client, bucket, prefix))
    }

    fn key(&self, relative: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", prefix, relative)
        }
    }
}

#[async_trait]
impl UploadTarget for S3UploadTarget {
    async fn ensure_folder(&self, path: &str) -> Result<FolderHandle> {
        let folder = FolderHandle::new(path);
        let key = format!("{}/", self.key(folder.path()));

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from_static(b""))
            .send()
            .await
            .map_err(|e| AppError::upload(format!("s3://{}/{}: {}", self.bucket, key, e)))?;

        log::debug!("Ensured s3://{}/{}", self.bucket, key);
        Ok(folder)
    }

    async fn upload(&self, file: &Path, folder: &FolderHandle, remote_name: &str) -> Result<()> {
        let key = self.key(&folder.key(remote_name));
        let body = ByteStream::from_path(file)
            .await
            .map_err(|e| AppError::upload(format!("{}: {}", file.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::upload(format!("s3://{}/{}: {}", self.bucket, key, e)))?;

        log::info!("Uploaded \"{}\" to s3://{}/{}", remote_name, self.bucket, key);
        Ok(())
    }
}
