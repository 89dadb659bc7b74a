//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::FetchSource;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP client settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Mirror discovery and rotation settings
    #[serde(default)]
    pub mirrors: MirrorConfig,

    /// Media download settings
    #[serde(default)]
    pub media: MediaConfig,

    /// Upload destination settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Per-run settings
    #[serde(default)]
    pub run: RunConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.mirrors.pages_per_mirror == 0 {
            return Err(AppError::validation("mirrors.pages_per_mirror must be > 0"));
        }
        if self.mirrors.max_select_attempts == 0 {
            return Err(AppError::validation(
                "mirrors.max_select_attempts must be > 0",
            ));
        }
        if self.mirrors.max_page_failures == 0 {
            return Err(AppError::validation("mirrors.max_page_failures must be > 0"));
        }
        match self.mirrors.directory {
            DirectoryKind::Redirect if self.mirrors.discovery_url.trim().is_empty() => {
                return Err(AppError::validation("mirrors.discovery_url is empty"));
            }
            DirectoryKind::Region if self.mirrors.instance_list_url.trim().is_empty() => {
                return Err(AppError::validation("mirrors.instance_list_url is empty"));
            }
            _ => {}
        }
        if self.media.chunk_size_mib == 0 {
            return Err(AppError::validation("media.chunk_size_mib must be > 0"));
        }
        if self.upload.folder_prefix.trim().is_empty() {
            return Err(AppError::validation("upload.folder_prefix is empty"));
        }
        Ok(())
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Deadline for a single page or discovery request, in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// TCP connect timeout in seconds
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            connect_timeout_secs: defaults::connect_timeout(),
        }
    }
}

/// Where candidate mirrors come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryKind {
    /// A redirect service that forwards to a random mirror
    Redirect,
    /// A published instance list, restricted to one hosting region
    Region,
}

/// Mirror discovery and rotation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default = "defaults::directory")]
    pub directory: DirectoryKind,

    /// Redirect service URL
    #[serde(default = "defaults::discovery_url")]
    pub discovery_url: String,

    /// Markdown instance list URL
    #[serde(default = "defaults::instance_list_url")]
    pub instance_list_url: String,

    /// Path fetched to verify a region-list mirror answers
    #[serde(default = "defaults::probe_path")]
    pub probe_path: String,

    /// Pause between selection attempts
    #[serde(default = "defaults::cooldown")]
    pub cooldown_secs: u64,

    /// Upper bound on selection attempts before giving up
    #[serde(default = "defaults::max_select_attempts")]
    pub max_select_attempts: u32,

    /// Successful pages served by one mirror before rotating
    #[serde(default = "defaults::pages_per_mirror")]
    pub pages_per_mirror: u32,

    /// Consecutive failed page requests tolerated before the run fails
    #[serde(default = "defaults::max_page_failures")]
    pub max_page_failures: u32,

    /// Hosts that are never selected
    #[serde(default = "defaults::bad_mirrors")]
    pub bad_mirrors: Vec<String>,

    /// Hosts rejected only in region mode
    #[serde(default = "defaults::region_excluded")]
    pub region_excluded: Vec<String>,
}

impl MirrorConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            directory: defaults::directory(),
            discovery_url: defaults::discovery_url(),
            instance_list_url: defaults::instance_list_url(),
            probe_path: defaults::probe_path(),
            cooldown_secs: defaults::cooldown(),
            max_select_attempts: defaults::max_select_attempts(),
            pages_per_mirror: defaults::pages_per_mirror(),
            max_page_failures: defaults::max_page_failures(),
            bad_mirrors: defaults::bad_mirrors(),
            region_excluded: defaults::region_excluded(),
        }
    }
}

/// External program used to remux streaming playlists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemuxerKind {
    Vsd,
    Ffmpeg,
}

/// Media download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Write buffer size for streamed downloads, in MiB
    #[serde(default = "defaults::chunk_size_mib")]
    pub chunk_size_mib: usize,

    /// Deadline for a single media download
    #[serde(default = "defaults::download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default = "defaults::remuxer")]
    pub remuxer: RemuxerKind,

    #[serde(default = "defaults::vsd_bin")]
    pub vsd_bin: String,

    #[serde(default = "defaults::ffmpeg_bin")]
    pub ffmpeg_bin: String,
}

impl MediaConfig {
    pub fn chunk_size(&self) -> usize {
        self.chunk_size_mib * MEBIBYTE
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

const MEBIBYTE: usize = 1024 * 1024;

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            chunk_size_mib: defaults::chunk_size_mib(),
            download_timeout_secs: defaults::download_timeout(),
            remuxer: defaults::remuxer(),
            vsd_bin: defaults::vsd_bin(),
            ffmpeg_bin: defaults::ffmpeg_bin(),
        }
    }
}

/// Upload backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadBackend {
    Local,
    S3,
}

/// Upload destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "defaults::upload_backend")]
    pub backend: UploadBackend,

    /// Root directory for the local backend
    #[serde(default = "defaults::local_dir")]
    pub local_dir: String,

    /// Remote folder prefix; accounts land in `{prefix}/{account}`
    #[serde(default = "defaults::folder_prefix")]
    pub folder_prefix: String,

    /// S3 bucket, overridden by `S3_BUCKET`
    #[serde(default)]
    pub s3_bucket: Option<String>,

    /// S3 key prefix, overridden by `S3_PREFIX`
    #[serde(default)]
    pub s3_prefix: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            backend: defaults::upload_backend(),
            local_dir: defaults::local_dir(),
            folder_prefix: defaults::folder_prefix(),
            s3_bucket: None,
            s3_prefix: None,
        }
    }
}

/// Per-run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "defaults::source")]
    pub source: FetchSource,

    /// Stop after the first page (debugging)
    #[serde(default)]
    pub one_page_only: bool,

    /// Stop after this many posts per account (debugging)
    #[serde(default)]
    pub max_posts: Option<usize>,

    /// Accounts crawled when none are given on the command line
    #[serde(default)]
    pub accounts: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source: defaults::source(),
            one_page_only: false,
            max_posts: None,
            accounts: Vec::new(),
        }
    }
}

mod defaults {
    use super::{DirectoryKind, RemuxerKind, UploadBackend};
    use crate::models::FetchSource;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 6.3; Win64; x64; rv:103.0) Gecko/20100101 Firefox/103.0".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn connect_timeout() -> u64 {
        10
    }

    // Mirror defaults
    pub fn directory() -> DirectoryKind {
        // Age-restricted timelines are only served by US-hosted mirrors.
        DirectoryKind::Region
    }
    pub fn discovery_url() -> String {
        "https://twiiit.com/twitter".into()
    }
    pub fn instance_list_url() -> String {
        "https://raw.githubusercontent.com/wiki/zedeus/nitter/Instances.md".into()
    }
    pub fn probe_path() -> String {
        "/twitter".into()
    }
    pub fn cooldown() -> u64 {
        3
    }
    pub fn max_select_attempts() -> u32 {
        50
    }
    pub fn pages_per_mirror() -> u32 {
        3
    }
    pub fn max_page_failures() -> u32 {
        3
    }
    pub fn bad_mirrors() -> Vec<String> {
        // Cloudflare-fronted mirrors mangle .m3u8 playlists; the sneed
        // mirrors serve no media at all.
        vec![
            "nitter.domain.glass".into(),
            "nitter.winscloud.net".into(),
            "twtr.bch.bar".into(),
            "twitter.dr460nf1r3.org".into(),
            "nitter.garudalinux.org".into(),
            "nitter.rawbit.ninja".into(),
            "nitter.privacytools.io".into(),
            "nitter.sneed.network".into(),
            "n.sneed.network".into(),
            "nitter.d420.de".into(),
            "nitter.caioalonso.com".into(),
        ]
    }
    pub fn region_excluded() -> Vec<String> {
        // US-hosted, but still hide age-restricted posts
        vec![
            "birdsite.xanny.family".into(),
            "tweet.lambda.dance".into(),
            "nitter.pw".into(),
        ]
    }

    // Media defaults
    pub fn chunk_size_mib() -> usize {
        300
    }
    pub fn download_timeout() -> u64 {
        30 * 60
    }
    pub fn remuxer() -> RemuxerKind {
        RemuxerKind::Vsd
    }
    pub fn vsd_bin() -> String {
        "vsd".into()
    }
    pub fn ffmpeg_bin() -> String {
        "ffmpeg".into()
    }

    // Upload defaults
    pub fn upload_backend() -> UploadBackend {
        UploadBackend::Local
    }
    pub fn local_dir() -> String {
        "archive".into()
    }
    pub fn folder_prefix() -> String {
        "tw".into()
    }

    // Run defaults
    pub fn source() -> FetchSource {
        // The media tab returns nothing for age-restricted accounts.
        FetchSource::Search
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.crawler.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_pages_per_mirror() {
        let mut config = Config::default();
        config.mirrors.pages_per_mirror = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_discovery_url_in_redirect_mode() {
        let mut config = Config::default();
        config.mirrors.directory = DirectoryKind::Redirect;
        config.mirrors.discovery_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [mirrors]
            directory = "redirect"
            pages_per_mirror = 5

            [run]
            source = "media"
            accounts = ["someone"]
            "#,
        )
        .unwrap();

        assert_eq!(config.mirrors.directory, DirectoryKind::Redirect);
        assert_eq!(config.mirrors.pages_per_mirror, 5);
        assert_eq!(config.mirrors.cooldown_secs, 3);
        assert!(config.mirrors.bad_mirrors.contains(&"twtr.bch.bar".to_string()));
        assert_eq!(config.run.source, FetchSource::Media);
        assert_eq!(config.run.accounts, vec!["someone".to_string()]);
        assert_eq!(config.media.chunk_size(), 300 * 1024 * 1024);
        assert_eq!(config.upload.folder_prefix, "tw");
    }
}
