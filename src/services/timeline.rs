// src/services/timeline.rs

//! Timeline pagination across rotating mirrors.

use std::collections::VecDeque;
use std::time::Duration;

use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::{Config, CrawlCursor, FetchSource, Mirror, PostRecord};
use crate::services::extract::{MarkupExtractor, TimelinePage};
use crate::services::mirrors::MirrorPool;
use crate::utils::http::fetch_text;

/// Pagination tuning.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Successful pages per mirror before a periodic rotation
    pub pages_per_mirror: u32,
    /// Consecutive failed requests before the crawl gives up
    pub max_page_failures: u32,
    /// Deadline for one page request
    pub page_timeout: Duration,
    /// Stop after the first page regardless of the cursor
    pub one_page_only: bool,
}

impl From<&Config> for CrawlSettings {
    fn from(config: &Config) -> Self {
        Self {
            pages_per_mirror: config.mirrors.pages_per_mirror,
            max_page_failures: config.mirrors.max_page_failures,
            page_timeout: config.crawler.timeout(),
            one_page_only: config.run.one_page_only,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CrawlState {
    /// A mirror has to be selected before the next request
    NoMirror,
    /// The page at the current cursor is due
    Fetching,
    /// Posts of the last page are being handed out
    Emitting { next: Option<CrawlCursor> },
    /// Moving on to the next page, rotating first if the mirror is used up
    Switching,
    Done,
}

/// Pull-based sequence of one account's posts.
///
/// Pages are requested strictly one after the other because every cursor
/// comes from the previous page. Call [`TimelineCrawler::next_post`] until it
/// returns `Ok(None)`.
pub struct TimelineCrawler<'a> {
    client: &'a Client,
    pool: &'a mut MirrorPool,
    extractor: &'a MarkupExtractor,
    account: String,
    source: FetchSource,
    settings: CrawlSettings,
    state: CrawlState,
    mirror: Option<Mirror>,
    cursor: CrawlCursor,
    pages_on_mirror: u32,
    page_count: u32,
    failures: u32,
    buffer: VecDeque<PostRecord>,
}

impl<'a> TimelineCrawler<'a> {
    pub fn new(
        client: &'a Client,
        pool: &'a mut MirrorPool,
        extractor: &'a MarkupExtractor,
        account: impl Into<String>,
        source: FetchSource,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            client,
            pool,
            extractor,
            account: account.into(),
            source,
            settings,
            state: CrawlState::NoMirror,
            mirror: None,
            cursor: CrawlCursor::start(),
            pages_on_mirror: 0,
            page_count: 0,
            failures: 0,
            buffer: VecDeque::new(),
        }
    }

    /// Pages that yielded posts (or ended the timeline) so far.
    pub fn pages_fetched(&self) -> u32 {
        self.page_count
    }

    /// Next post in timeline order, or `None` once the timeline is exhausted.
    pub async fn next_post(&mut self) -> Result<Option<PostRecord>> {
        loop {
            match std::mem::replace(&mut self.state, CrawlState::Done) {
                CrawlState::Done => return Ok(None),
                CrawlState::NoMirror => {
                    let mirror = self.pool.select(self.client).await?;
                    self.mirror = Some(mirror);
                    self.pages_on_mirror = 0;
                    self.state = CrawlState::Fetching;
                }
                CrawlState::Fetching => {
                    self.state = self.fetch_page().await?;
                }
                CrawlState::Emitting { next } => {
                    if let Some(post) = self.buffer.pop_front() {
                        self.state = CrawlState::Emitting { next };
                        return Ok(Some(post));
                    }
                    self.state = match next {
                        Some(cursor) if !self.settings.one_page_only => {
                            self.cursor = cursor;
                            CrawlState::Switching
                        }
                        _ => CrawlState::Done,
                    };
                }
                CrawlState::Switching => {
                    self.state = if self.pages_on_mirror >= self.settings.pages_per_mirror {
                        CrawlState::NoMirror
                    } else {
                        CrawlState::Fetching
                    };
                }
            }
        }
    }

    /// Request the page at the current cursor and decide the next state.
    async fn fetch_page(&mut self) -> Result<CrawlState> {
        let Some(mirror) = self.mirror.clone() else {
            return Ok(CrawlState::NoMirror);
        };
        let url = mirror.page_url(&self.account, self.source, &self.cursor);
        log::info!("request no. {} {}", self.page_count + 1, url);

        let markup = match fetch_text(self.client, &url, self.settings.page_timeout).await {
            Ok(markup) => markup,
            Err(e) => {
                self.failures += 1;
                if self.failures >= self.settings.max_page_failures {
                    return Err(AppError::crawl(url, e));
                }
                log::warn!(
                    "Request failed ({}/{}), switching mirror: {}",
                    self.failures,
                    self.settings.max_page_failures,
                    e
                );
                return Ok(CrawlState::NoMirror);
            }
        };

        let TimelinePage { posts, cursor } =
            match self.extractor.extract(&markup, &mirror, self.source) {
                Ok(page) => page,
                Err(symptom) => {
                    log::warn!("{} on {}, have to switch mirror", symptom, mirror);
                    self.pool.mark_bad(mirror.host());
                    return Ok(CrawlState::NoMirror);
                }
            };

        self.failures = 0;
        self.page_count += 1;
        self.pages_on_mirror += 1;

        for post in posts {
            if post.is_empty() {
                log::warn!("Skipping timeline item without a permalink on {}", url);
                continue;
            }
            self.buffer.push_back(post);
        }

        Ok(CrawlState::Emitting { next: cursor })
    }
}
