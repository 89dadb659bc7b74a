// src/pipeline/archive.rs

//! Account archiving pipeline.
//!
//! Crawl → download → upload, one post at a time. A post that fails to
//! download or upload is counted and skipped; only mirror exhaustion and
//! crawl failures end an account's run.

use std::path::Path;

use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::{Config, DownloadedArtifactSet, PostRecord, RunSummary};
use crate::services::{CrawlSettings, MarkupExtractor, MediaFetcher, MirrorPool, TimelineCrawler};
use crate::storage::{FolderHandle, StagingDir, UploadTarget, account_folder};

/// Archive every post of `account` into `target`.
pub async fn run_archive(
    config: &Config,
    client: &Client,
    pool: &mut MirrorPool,
    target: &dyn UploadTarget,
    account: &str,
) -> Result<RunSummary> {
    crate::utils::log::header(&format!("Archiving @{} ({})", account, config.run.source.tab()));

    let folder = target
        .ensure_folder(&account_folder(&config.upload.folder_prefix, account))
        .await?;
    let staging = StagingDir::create()?;
    let extractor = MarkupExtractor::new()?;
    let fetcher = MediaFetcher::from_config(client.clone(), &config.media);

    let mut crawler = TimelineCrawler::new(
        client,
        pool,
        &extractor,
        account,
        config.run.source,
        CrawlSettings::from(config),
    );

    let mut summary = RunSummary::default();
    loop {
        if config.run.max_posts.is_some_and(|max| summary.posts_seen >= max) {
            log::info!("Reached the post cap of {}", summary.posts_seen);
            break;
        }
        let Some(post) = crawler.next_post().await? else {
            break;
        };
        summary.posts_seen += 1;

        match archive_post(&fetcher, target, &folder, &post, staging.path()).await {
            Ok(uploaded) => {
                summary.posts_archived += 1;
                summary.files_uploaded += uploaded.files;
                summary.media_skipped += uploaded.skipped;
            }
            Err(e) => {
                log::error!("Failed to archive {}: {}", post.link, e);
                summary.posts_failed += 1;
            }
        }
    }
    let pages = crawler.pages_fetched();

    crate::utils::log::summary(
        &format!("@{}", account),
        &[
            ("Pages", pages.to_string()),
            ("Posts seen", summary.posts_seen.to_string()),
            ("Posts archived", summary.posts_archived.to_string()),
            ("Posts failed", summary.posts_failed.to_string()),
            ("Files uploaded", summary.files_uploaded.to_string()),
            ("Media skipped", summary.media_skipped.to_string()),
            ("Mirror switches", pool.switches().to_string()),
        ],
    );

    Ok(summary)
}

/// Archive several accounts one after another with one shared pool.
///
/// A failed crawl is logged and the next account starts; running out of
/// mirrors stops the whole run.
pub async fn run_accounts(
    config: &Config,
    client: &Client,
    pool: &mut MirrorPool,
    target: &dyn UploadTarget,
    accounts: &[String],
) -> Result<Vec<(String, RunSummary)>> {
    let mut results = Vec::with_capacity(accounts.len());
    for account in accounts {
        match run_archive(config, client, pool, target, account).await {
            Ok(summary) => results.push((account.clone(), summary)),
            Err(e @ AppError::MirrorUnavailable { .. }) => return Err(e),
            Err(e) => log::error!("Archiving @{} failed: {}", account, e),
        }
    }
    Ok(results)
}

struct Uploaded {
    files: usize,
    skipped: usize,
}

async fn archive_post(
    fetcher: &MediaFetcher,
    target: &dyn UploadTarget,
    folder: &FolderHandle,
    post: &PostRecord,
    staging: &Path,
) -> Result<Uploaded> {
    let artifacts = fetcher.download_post(post, staging).await?;
    let result = upload_artifacts(target, folder, &artifacts).await;
    discard(&artifacts).await;

    Ok(Uploaded {
        files: result?,
        skipped: artifacts.skipped,
    })
}

async fn upload_artifacts(
    target: &dyn UploadTarget,
    folder: &FolderHandle,
    artifacts: &DownloadedArtifactSet,
) -> Result<usize> {
    let mut uploaded = 0;
    for file in artifacts.files() {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::upload(format!("no file name in {}", file.display())))?;
        target.upload(file, folder, &name).await?;
        uploaded += 1;
    }
    Ok(uploaded)
}

/// Free staging space once a post is done.
async fn discard(artifacts: &DownloadedArtifactSet) {
    for file in artifacts.files() {
        if let Err(e) = tokio::fs::remove_file(file).await {
            log::debug!("Could not remove {}: {}", file.display(), e);
        }
    }
}
