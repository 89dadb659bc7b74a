//! Mirror origins, fetch sources and pagination cursors.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::utils::resolve_url;

/// One front-end believed to serve the public timeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mirror {
    origin: Url,
    host: String,
}

impl Mirror {
    /// Build a mirror from any URL served by it. Only scheme, host and port
    /// are kept.
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str().filter(|h| !h.is_empty())?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let origin = Url::parse(&url.origin().ascii_serialization()).ok()?;
        Some(Self { origin, host })
    }

    /// Build a mirror from a bare hostname reached over `scheme`.
    pub fn from_host(scheme: &str, hostname: &str) -> Option<Self> {
        let hostname = hostname.trim();
        if hostname.is_empty() {
            return None;
        }
        Url::parse(&format!("{scheme}://{hostname}"))
            .ok()
            .and_then(|url| Self::from_url(&url))
    }

    /// Host (with port when non-default); this is the key of the bad set.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// `scheme://host[:port]` without a trailing slash.
    pub fn origin(&self) -> String {
        self.origin.as_str().trim_end_matches('/').to_string()
    }

    /// Qualify a link found in this mirror's markup. Relative paths are
    /// rooted at the mirror; empty input stays empty.
    pub fn resolve(&self, href: &str) -> String {
        let href = href.trim();
        if href.is_empty() {
            return String::new();
        }
        resolve_url(&self.origin, href)
    }

    /// `{mirror}/{account}/{mode}{cursor}`
    pub fn page_url(&self, account: &str, source: FetchSource, cursor: &CrawlCursor) -> String {
        format!(
            "{}/{}/{}{}",
            self.origin(),
            account,
            source.tab(),
            cursor.as_str()
        )
    }
}

impl fmt::Display for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.origin())
    }
}

/// Which timeline tab is crawled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchSource {
    /// The dedicated media tab
    Media,
    /// The search tab; also carries text-only posts and retweets
    Search,
}

impl FetchSource {
    /// Lowercase tab name used in page URLs.
    pub fn tab(self) -> &'static str {
        match self {
            FetchSource::Media => "media",
            FetchSource::Search => "search",
        }
    }
}

/// Opaque continuation token taken from a "load more" link.
///
/// The token is relative to the mirror that produced it and is appended
/// verbatim to the timeline URL (it normally starts with `?cursor=`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlCursor(String);

impl CrawlCursor {
    /// Start of the timeline.
    pub fn start() -> Self {
        Self::default()
    }

    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
