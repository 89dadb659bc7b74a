//! Post record data structures.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One post parsed from a timeline item.
///
/// Every non-empty URL field is absolute. Links that the mirror rendered as
/// relative paths are rooted at that mirror.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostRecord {
    /// Permalink of the post
    pub link: String,

    /// Display name of the author
    pub author_fullname: String,

    /// Post time; the Unix epoch when the page did not carry a usable date
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,

    /// Inner markup of the content container
    pub text_html: String,

    /// Text content with all markup removed
    pub text_plain: String,

    pub photo_urls: Vec<String>,

    /// Short looping videos
    pub gif_urls: Vec<String>,

    /// Primary video; usually an HLS playlist
    pub video_url: String,

    pub videothumb_url: String,
}

impl PostRecord {
    /// A record without a permalink is the "nothing extracted" sentinel.
    pub fn is_empty(&self) -> bool {
        self.link.is_empty()
    }

    pub fn has_video(&self) -> bool {
        !self.video_url.is_empty()
    }

    /// Number of media files this record references.
    pub fn media_count(&self) -> usize {
        let video = if self.has_video() { 1 } else { 0 };
        self.photo_urls.len() + self.gif_urls.len() + video
    }
}

impl Default for PostRecord {
    fn default() -> Self {
        Self {
            link: String::new(),
            author_fullname: String::new(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            text_html: String::new(),
            text_plain: String::new(),
            photo_urls: Vec::new(),
            gif_urls: Vec::new(),
            video_url: String::new(),
            videothumb_url: String::new(),
        }
    }
}

/// Contents of the `tw_info_*.json` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMetadata {
    #[serde(flatten)]
    pub post: PostRecord,

    #[serde(with = "iso8601")]
    pub downloaded_at: DateTime<Utc>,
}

/// Local files written for one post.
#[derive(Debug, Clone, Default)]
pub struct DownloadedArtifactSet {
    /// The metadata file
    pub info: PathBuf,

    /// Media files that were actually saved
    pub media: Vec<PathBuf>,

    /// Media that could not be fetched
    pub skipped: usize,
}

impl DownloadedArtifactSet {
    /// Metadata first, then media in download order.
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        std::iter::once(&self.info).chain(self.media.iter())
    }
}

/// `2022-11-01T16:34:00+00:00` rather than chrono's default `Z` suffix.
mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, false))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
