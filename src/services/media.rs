// src/services/media.rs

//! Media downloads.
//!
//! Every file of a post is fetched on its own. A missing photo or a broken
//! thumbnail is logged and skipped so the rest of the post still makes it to
//! the upload.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::process::Command;

use crate::error::Result;
use crate::models::{DownloadedArtifactSet, MediaConfig, PostMetadata, PostRecord, RemuxerKind};

/// Result of fetching one media file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Saved(PathBuf),
    Skipped { reason: String },
}

/// External program that turns a streaming playlist into one file.
#[derive(Debug, Clone)]
pub struct Remuxer {
    kind: RemuxerKind,
    program: String,
    timeout: Duration,
}

impl Remuxer {
    pub fn new(kind: RemuxerKind, program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            kind,
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        let program = match config.remuxer {
            RemuxerKind::Vsd => &config.vsd_bin,
            RemuxerKind::Ffmpeg => &config.ffmpeg_bin,
        };
        Self::new(config.remuxer, program.clone(), config.download_timeout())
    }

    /// Command-line arguments for remuxing `url` into `target`.
    pub fn args(&self, url: &str, target: &Path) -> Vec<String> {
        let target = target.display().to_string();
        match self.kind {
            RemuxerKind::Vsd => vec![
                "save".into(),
                url.into(),
                "-q".into(),
                "highest".into(),
                "-o".into(),
                target,
            ],
            RemuxerKind::Ffmpeg => vec![
                "-i".into(),
                url.into(),
                "-c".into(),
                "copy".into(),
                target,
            ],
        }
    }

    async fn run(&self, url: &str, target: &Path) -> FetchOutcome {
        let args = self.args(url, target);
        log::info!("{} {}", self.program, args.join(" "));

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let Ok(output) = tokio::time::timeout(self.timeout, command.output()).await else {
            log::warn!("{} timed out after {:?}", self.program, self.timeout);
            discard_partial(target).await;
            return FetchOutcome::Skipped {
                reason: format!("{} timed out after {:?}", self.program, self.timeout),
            };
        };

        match output {
            Ok(output) if output.status.success() && target.exists() => {
                log::info!("Downloaded \"{}\".", target.display());
                FetchOutcome::Saved(target.to_path_buf())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                log::warn!("{} failed ({}): {}", self.program, output.status, stderr.trim());
                FetchOutcome::Skipped {
                    reason: format!("{} exited with {}", self.program, output.status),
                }
            }
            Err(e) => {
                log::warn!("Could not start {}: {}", self.program, e);
                FetchOutcome::Skipped {
                    reason: format!("could not start {}: {e}", self.program),
                }
            }
        }
    }
}

/// Downloads media files to local storage.
pub struct MediaFetcher {
    client: Client,
    chunk_size: usize,
    timeout: Duration,
    remuxer: Remuxer,
}

impl MediaFetcher {
    pub fn new(client: Client, chunk_size: usize, timeout: Duration, remuxer: Remuxer) -> Self {
        Self {
            client,
            chunk_size: chunk_size.max(1),
            timeout,
            remuxer,
        }
    }

    pub fn from_config(client: Client, config: &MediaConfig) -> Self {
        Self::new(
            client,
            config.chunk_size(),
            config.download_timeout(),
            Remuxer::from_config(config),
        )
    }

    /// Stream `url` into `target`.
    ///
    /// At most `chunk_size` bytes are held in memory before they are written
    /// out. Non-success statuses are skipped, not raised; transport and disk
    /// errors are returned to the caller.
    pub async fn fetch(&self, url: &str, target: &Path) -> Result<FetchOutcome> {
        if url.is_empty() {
            return Ok(FetchOutcome::Skipped {
                reason: "no URL".to_string(),
            });
        }

        let response = self.client.get(url).timeout(self.timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            log::warn!("{} answered {}", url, status);
            log::warn!("Skipped downloading \"{}\".", target.display());
            return Ok(FetchOutcome::Skipped {
                reason: format!("HTTP {status}"),
            });
        }

        if let Err(e) = self.write_body(response, target).await {
            discard_partial(target).await;
            return Err(e);
        }

        log::info!("Downloaded \"{}\".", target.display());
        Ok(FetchOutcome::Saved(target.to_path_buf()))
    }

    async fn write_body(&self, response: reqwest::Response, target: &Path) -> Result<()> {
        let file = File::create(target).await?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            writer.write_all(&chunk?).await?;
        }
        writer.flush().await?;
        Ok(())
    }

    /// Fetch a video: playlists go through the remuxer, plain files are
    /// streamed like any other media.
    pub async fn fetch_video(&self, url: &str, target: &Path) -> Result<FetchOutcome> {
        if is_playlist(url) {
            Ok(self.remuxer.run(url, target).await)
        } else {
            self.fetch(url, target).await
        }
    }

    /// Write the metadata file and all media of `post` into `dir`.
    ///
    /// A single failed media file never fails the post.
    pub async fn download_post(&self, post: &PostRecord, dir: &Path) -> Result<DownloadedArtifactSet> {
        crate::utils::log::post_overview(post);

        let t = timestamp_token();
        let info = dir.join(format!("tw_info_{t}.json"));
        let metadata = PostMetadata {
            post: post.clone(),
            downloaded_at: Utc::now(),
        };
        tokio::fs::write(&info, serde_json::to_vec_pretty(&metadata)?).await?;

        let mut artifacts = DownloadedArtifactSet {
            info,
            ..DownloadedArtifactSet::default()
        };

        for (i, url) in post.photo_urls.iter().enumerate() {
            let target = dir.join(format!("tw_photo_{t}_{i}.jpg"));
            let outcome = self.fetch_logged(url, &target).await;
            artifacts.record(outcome);
        }

        for (i, url) in post.gif_urls.iter().enumerate() {
            let target = dir.join(format!("tw_gif_{t}_{i}.mp4"));
            let outcome = self.fetch_logged(url, &target).await;
            artifacts.record(outcome);
        }

        if post.has_video() {
            let target = dir.join(format!("tw_video_{t}.mp4"));
            let outcome = match self.fetch_video(&post.video_url, &target).await {
                Ok(outcome) => outcome,
                Err(e) => skipped_on_error(&post.video_url, e),
            };
            artifacts.record(outcome);

            let target = dir.join(format!("tw_thumb_{t}.jpg"));
            let outcome = self.fetch_logged(&post.videothumb_url, &target).await;
            artifacts.record(outcome);
        }

        Ok(artifacts)
    }

    async fn fetch_logged(&self, url: &str, target: &Path) -> FetchOutcome {
        match self.fetch(url, target).await {
            Ok(outcome) => outcome,
            Err(e) => skipped_on_error(url, e),
        }
    }
}

impl DownloadedArtifactSet {
    fn record(&mut self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Saved(path) => self.media.push(path),
            FetchOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Remove whatever a failed download left behind.
async fn discard_partial(target: &Path) {
    match tokio::fs::remove_file(target).await {
        Ok(()) => log::debug!("Removed partial file {}", target.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not remove {}: {}", target.display(), e),
    }
}

fn skipped_on_error(url: &str, e: crate::error::AppError) -> FetchOutcome {
    log::warn!("Download of {} failed: {}", url, e);
    FetchOutcome::Skipped {
        reason: e.to_string(),
    }
}

/// Adaptive streaming playlists need remuxing.
pub fn is_playlist(url: &str) -> bool {
    let lowered = url.to_lowercase();
    let path = lowered.split(['?', '#']).next().unwrap_or_default();
    path.ends_with(".m3u8") || path.contains(".m3u8%3f")
}

/// High-resolution token shared by all files of one post,
/// e.g. `1669396112.482113`.
pub fn timestamp_token() -> String {
    let now = Utc::now();
    format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros())
}
