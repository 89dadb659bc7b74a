// src/services/mirrors.rs

//! Mirror discovery and selection.
//!
//! Mirrors come and go without notice. A [`MirrorDirectory`] proposes one
//! candidate per attempt; the [`MirrorPool`] filters out known-bad hosts and
//! retries with a cool-down until it has a usable mirror or runs out of
//! attempts.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use regex::Regex;
use reqwest::Client;
use tokio::sync::OnceCell;

use crate::error::{AppError, Result};
use crate::models::{DirectoryKind, Mirror, MirrorConfig};
use crate::utils::normalize_host;

/// Markdown table rows of the instance list whose region column is the US
/// flag or the globe. The variation selector U+FE0F is optional.
static REGION_ROW_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\| *\[(.+?)\].*?\|.+?\|.+?\| *(?:\x{1f1fa}\x{1f1f8}\x{fe0f}?|\x{1f30f}\x{fe0f}?) *\|.+$",
    )
    .expect("region row pattern is valid")
});

/// Source of candidate mirrors.
#[async_trait]
pub trait MirrorDirectory: Send + Sync {
    /// Propose one mirror, or `None` when this attempt failed.
    async fn discover(&self, client: &Client) -> Option<Mirror>;

    /// Hosts this directory never wants, on top of the pool's bad set.
    fn is_excluded(&self, _mirror: &Mirror) -> bool {
        false
    }
}

/// A redirect service that forwards every request to a random mirror.
pub struct RedirectDirectory {
    url: String,
    timeout: Duration,
}

impl RedirectDirectory {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MirrorDirectory for RedirectDirectory {
    async fn discover(&self, client: &Client) -> Option<Mirror> {
        let response = match client.get(&self.url).timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Mirror switch unsuccessful: {}", e);
                return None;
            }
        };
        if !response.status().is_success() {
            log::warn!(
                "Mirror switch unsuccessful: {} answered {}",
                self.url,
                response.status()
            );
            return None;
        }
        Mirror::from_url(response.url())
    }
}

/// A published instance list, restricted to mirrors hosted in one region.
pub struct RegionDirectory {
    list_url: String,
    probe_path: String,
    excluded: HashSet<String>,
    timeout: Duration,
    scheme: String,
    hosts: OnceCell<Vec<String>>,
}

impl RegionDirectory {
    pub fn new(
        list_url: impl Into<String>,
        probe_path: impl Into<String>,
        excluded: impl IntoIterator<Item = String>,
        timeout: Duration,
    ) -> Self {
        Self {
            list_url: list_url.into(),
            probe_path: probe_path.into(),
            excluded: excluded.into_iter().map(|h| normalize_host(&h)).collect(),
            timeout,
            scheme: "https".to_string(),
            hosts: OnceCell::new(),
        }
    }

    /// Reach listed hosts over `scheme` instead of HTTPS.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// The list is fetched once and kept for the lifetime of the directory.
    /// A list without any usable row is not kept, so the next attempt
    /// fetches it again.
    async fn hosts(&self, client: &Client) -> Result<&[String]> {
        let hosts = self
            .hosts
            .get_or_try_init(|| async {
                let text = crate::utils::http::fetch_text(client, &self.list_url, self.timeout)
                    .await?;
                let hosts = parse_region_hosts(&text);
                if hosts.is_empty() {
                    return Err(AppError::crawl(&self.list_url, "no region mirrors in list"));
                }
                log::info!("Loaded {} region mirrors from {}", hosts.len(), self.list_url);
                Ok::<_, AppError>(hosts)
            })
            .await?;
        Ok(hosts.as_slice())
    }
}

#[async_trait]
impl MirrorDirectory for RegionDirectory {
    async fn discover(&self, client: &Client) -> Option<Mirror> {
        let hosts = match self.hosts(client).await {
            Ok(hosts) => hosts,
            Err(e) => {
                log::warn!("Mirror list unavailable: {}", e);
                return None;
            }
        };
        // ThreadRng is not Send; keep it out of the await points below.
        let hostname = {
            let mut rng = rand::thread_rng();
            hosts.choose(&mut rng).cloned()
        }?;
        let mirror = Mirror::from_host(&self.scheme, &hostname)?;

        let probe = format!("{}{}", mirror.origin(), self.probe_path);
        match client.get(&probe).timeout(self.timeout).send().await {
            Ok(response) if response.status().is_success() => Some(mirror),
            Ok(response) => {
                log::warn!(
                    "Mirror switch unsuccessful: {} answered {}",
                    probe,
                    response.status()
                );
                None
            }
            Err(e) => {
                log::warn!("Mirror switch unsuccessful: {}", e);
                None
            }
        }
    }

    fn is_excluded(&self, mirror: &Mirror) -> bool {
        self.excluded.contains(mirror.host())
    }
}

/// Hostnames of all rows flagged with the required region marker.
pub fn parse_region_hosts(markdown: &str) -> Vec<String> {
    REGION_ROW_PATTERN
        .captures_iter(markdown)
        .map(|caps| caps[1].trim().to_string())
        .filter(|host| !host.is_empty())
        .collect()
}

/// Selection tuning.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub cooldown: Duration,
    pub max_attempts: u32,
}

impl From<&MirrorConfig> for PoolSettings {
    fn from(config: &MirrorConfig) -> Self {
        Self {
            cooldown: config.cooldown(),
            max_attempts: config.max_select_attempts,
        }
    }
}

/// Known-bad hosts plus the directory used to find replacements.
///
/// The pool is owned by the caller. Crawls that run concurrently either get
/// their own pool or share one behind a lock.
pub struct MirrorPool {
    directory: Box<dyn MirrorDirectory>,
    settings: PoolSettings,
    bad: HashSet<String>,
    attempts: u64,
    switches: u32,
    current: Option<Mirror>,
}

impl MirrorPool {
    pub fn new(
        directory: Box<dyn MirrorDirectory>,
        settings: PoolSettings,
        bad: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            directory,
            settings,
            bad: bad.into_iter().map(|h| normalize_host(&h)).collect(),
            attempts: 0,
            switches: 0,
            current: None,
        }
    }

    /// Build the pool described by the `[mirrors]` config section.
    pub fn from_config(config: &MirrorConfig, request_timeout: Duration) -> Self {
        let directory: Box<dyn MirrorDirectory> = match config.directory {
            DirectoryKind::Redirect => Box::new(RedirectDirectory::new(
                config.discovery_url.clone(),
                request_timeout,
            )),
            DirectoryKind::Region => Box::new(RegionDirectory::new(
                config.instance_list_url.clone(),
                config.probe_path.clone(),
                config.region_excluded.iter().cloned(),
                request_timeout,
            )),
        };
        Self::new(directory, config.into(), config.bad_mirrors.iter().cloned())
    }

    /// Select a fresh mirror that is not known to be bad.
    ///
    /// Every attempt except the very first one made by this pool waits for
    /// the cool-down. Fails with [`AppError::MirrorUnavailable`] once
    /// `max_attempts` attempts were spent.
    pub async fn select(&mut self, client: &Client) -> Result<Mirror> {
        for _ in 0..self.settings.max_attempts {
            if self.attempts > 0 && !self.settings.cooldown.is_zero() {
                tokio::time::sleep(self.settings.cooldown).await;
            }
            self.attempts += 1;

            let Some(mirror) = self.directory.discover(client).await else {
                continue;
            };
            if self.is_bad(mirror.host()) || self.directory.is_excluded(&mirror) {
                log::warn!("Mirror switch unsuccessful: bad mirror \"{}\"", mirror.host());
                continue;
            }

            self.switches += 1;
            let previous = self
                .current
                .as_ref()
                .map(|m| m.origin())
                .unwrap_or_else(|| "(None)".to_string());
            log::info!(
                "Mirror switch #{}: {} --> {}",
                self.switches,
                previous,
                mirror
            );
            self.current = Some(mirror.clone());
            return Ok(mirror);
        }

        Err(AppError::MirrorUnavailable {
            attempts: self.settings.max_attempts,
        })
    }

    /// Never select `host` again. Accepts bare hosts and origins.
    pub fn mark_bad(&mut self, host: &str) {
        let host = normalize_host(host);
        if self.bad.insert(host.clone()) {
            log::warn!("Marked mirror {} as bad", host);
        }
    }

    pub fn is_bad(&self, host: &str) -> bool {
        self.bad.contains(&normalize_host(host))
    }

    /// Number of successful selections so far.
    pub fn switches(&self) -> u32 {
        self.switches
    }

    /// The most recently selected mirror.
    pub fn current(&self) -> Option<&Mirror> {
        self.current.as_ref()
    }
}
