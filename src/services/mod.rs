//! Service layer for the crawler application.
//!
//! This module contains the business logic for:
//! - Mirror discovery and rotation (`MirrorPool`)
//! - Timeline markup extraction (`MarkupExtractor`)
//! - Cursor pagination (`TimelineCrawler`)
//! - Media downloads (`MediaFetcher`)

mod extract;
mod media;
mod mirrors;
mod timeline;

pub use extract::{MarkupExtractor, PageSymptom, TimelinePage, parse_post_date};
pub use media::{FetchOutcome, MediaFetcher, Remuxer, is_playlist, timestamp_token};
pub use mirrors::{
    MirrorDirectory, MirrorPool, PoolSettings, RedirectDirectory, RegionDirectory,
    parse_region_hosts,
};
pub use timeline::{CrawlSettings, TimelineCrawler};
