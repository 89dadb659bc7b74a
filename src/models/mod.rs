// src/models/mod.rs

//! Domain models for the crawler application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod mirror;
mod post;

// Re-export all public types
pub use config::{
    Config, CrawlerConfig, DirectoryKind, MediaConfig, MirrorConfig, RemuxerKind, RunConfig,
    UploadBackend, UploadConfig,
};
pub use mirror::{CrawlCursor, FetchSource, Mirror};
pub use post::{DownloadedArtifactSet, PostMetadata, PostRecord};

/// Counters for one account's run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub posts_seen: usize,
    pub posts_archived: usize,
    pub posts_failed: usize,
    pub files_uploaded: usize,
    pub media_skipped: usize,
}
