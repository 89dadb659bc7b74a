// src/services/extract.rs

//! Timeline page extraction.
//!
//! Turns one fetched timeline page into post records and the cursor of the
//! next page. Mirrors run different versions of the same front-end, so every
//! field is looked up independently and falls back to an empty value when the
//! markup does not carry it.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{CrawlCursor, FetchSource, Mirror, PostRecord};

/// Format is e.g. `Nov 1, 2022 · 4:34 PM UTC`.
static POST_DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<month>\w{3}) (?P<day>\d\d?), (?P<year>\d{4}) · (?P<hour>[01]?\d):(?P<minute>\d\d) (?P<ampm>AM|PM) UTC$",
    )
    .expect("post date pattern is valid")
});

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Page-level conditions that show the mirror itself is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSymptom {
    /// The body is not markup at all
    Unparseable,
    /// The mirror asks to turn on HLS playback, so videos on it are useless
    VideoDeliveryDisabled,
}

impl fmt::Display for PageSymptom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSymptom::Unparseable => f.write_str("page is not parseable markup"),
            PageSymptom::VideoDeliveryDisabled => f.write_str("HLS video delivery is disabled"),
        }
    }
}

/// Posts found on one page plus the continuation cursor, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelinePage {
    pub posts: Vec<PostRecord>,
    pub cursor: Option<CrawlCursor>,
}

struct Selectors {
    item: Selector,
    retweet_header: Selector,
    show_more: Selector,
    enable_hls: Selector,
    link: Selector,
    fullname: Selector,
    date: Selector,
    content: Selector,
    attachments: Selector,
    still_image: Selector,
    gif_source: Selector,
    video: Selector,
    source: Selector,
}

impl Selectors {
    fn new() -> Result<Self> {
        Ok(Self {
            item: parse_selector("div.timeline div.timeline-item:not(.show-more)")?,
            retweet_header: parse_selector("div.retweet-header")?,
            show_more: parse_selector("div.timeline-item + div.show-more > a[href]")?,
            enable_hls: parse_selector(r#"div.video-overlay > form[action="/enablehls"]"#)?,
            link: parse_selector(".tweet-link")?,
            fullname: parse_selector("a.fullname")?,
            date: parse_selector(".tweet-date > a:first-child")?,
            content: parse_selector("div.tweet-content.media-body")?,
            attachments: parse_selector("div.attachments")?,
            still_image: parse_selector("a.still-image")?,
            gif_source: parse_selector("video.gif source")?,
            video: parse_selector(".video-container > video")?,
            source: parse_selector("source")?,
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// First element under `scope` matching `selector`. No match is routine.
fn select_first<'a>(scope: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    scope.select(selector).next()
}

/// Extracts post records from timeline pages.
pub struct MarkupExtractor {
    selectors: Selectors,
}

impl MarkupExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            selectors: Selectors::new()?,
        })
    }

    /// Extract every post on `markup` served by `mirror`.
    ///
    /// In [`FetchSource::Search`] mode retweets are left out.
    pub fn extract(
        &self,
        markup: &str,
        mirror: &Mirror,
        source: FetchSource,
    ) -> std::result::Result<TimelinePage, PageSymptom> {
        let document = Html::parse_document(markup);
        if !has_content(&document) {
            return Err(PageSymptom::Unparseable);
        }
        if document.select(&self.selectors.enable_hls).next().is_some() {
            return Err(PageSymptom::VideoDeliveryDisabled);
        }

        let posts = document
            .select(&self.selectors.item)
            .filter(|item| {
                source != FetchSource::Search
                    || select_first(*item, &self.selectors.retweet_header).is_none()
            })
            .map(|item| self.parse_item(item, mirror))
            .collect();

        let cursor = document
            .select(&self.selectors.show_more)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(CrawlCursor::new);

        Ok(TimelinePage { posts, cursor })
    }

    /// Parse one timeline item. Missing fragments become empty values.
    pub fn parse_item(&self, item: ElementRef<'_>, mirror: &Mirror) -> PostRecord {
        let sel = &self.selectors;

        let link = select_first(item, &sel.link)
            .and_then(|a| a.value().attr("href"))
            .map(|href| mirror.resolve(href))
            .unwrap_or_default();

        let author_fullname = select_first(item, &sel.fullname)
            .map(|a| a.text().collect::<String>())
            .unwrap_or_default();

        let timestamp = select_first(item, &sel.date)
            .and_then(|a| a.value().attr("title"))
            .map(parse_post_date)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let (text_html, text_plain) = select_first(item, &sel.content)
            .map(|content| {
                (
                    content.inner_html().trim().to_string(),
                    content.text().collect::<String>().trim().to_string(),
                )
            })
            .unwrap_or_default();

        let mut post = PostRecord {
            link,
            author_fullname,
            timestamp,
            text_html,
            text_plain,
            ..PostRecord::default()
        };

        if let Some(attachments) = select_first(item, &sel.attachments) {
            post.photo_urls = attachments
                .select(&sel.still_image)
                .filter_map(|a| a.value().attr("href"))
                .map(|href| mirror.resolve(href))
                .collect();

            post.gif_urls = attachments
                .select(&sel.gif_source)
                .filter_map(|source| source.value().attr("src"))
                .map(|src| mirror.resolve(src))
                .collect();

            if let Some(video) = select_first(attachments, &sel.video) {
                // Most mirrors render `<video data-url="/video/...m3u8">`,
                // some embed `<source src="https://video.twimg.com/...mp4">`.
                let video_url = video.value().attr("data-url").or_else(|| {
                    select_first(video, &sel.source).and_then(|s| s.value().attr("src"))
                });
                post.video_url = video_url.map(|u| mirror.resolve(u)).unwrap_or_default();
                post.videothumb_url = video
                    .value()
                    .attr("poster")
                    .map(|u| mirror.resolve(u))
                    .unwrap_or_default();
            }
        }

        post
    }
}

/// True when the document holds anything beyond the implied skeleton.
fn has_content(document: &Html) -> bool {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .any(|el| !matches!(el.value().name(), "html" | "head" | "body"))
}

/// Parse a post date title such as `Nov 1, 2022 · 4:34 PM UTC`.
///
/// Anything that does not match yields the Unix epoch.
pub fn parse_post_date(title: &str) -> DateTime<Utc> {
    try_parse_post_date(title.trim()).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn try_parse_post_date(title: &str) -> Option<DateTime<Utc>> {
    let caps = POST_DATE_PATTERN.captures(title)?;

    let month_name = caps["month"].to_lowercase();
    let month = MONTHS.iter().position(|m| *m == month_name)? as u32 + 1;
    let day: u32 = caps["day"].parse().ok()?;
    let year: i32 = caps["year"].parse().ok()?;
    let hour12: u32 = caps["hour"].parse().ok()?;
    let minute: u32 = caps["minute"].parse().ok()?;

    if !(1..=12).contains(&hour12) {
        return None;
    }
    let hour = match (&caps["ampm"], hour12) {
        ("AM", 12) => 0,
        ("AM", h) => h,
        ("PM", 12) => 12,
        (_, h) => h + 12,
    };

    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, 0)
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn mirror() -> Mirror {
        Mirror::from_host("https", "m.example").unwrap()
    }

    fn page(items: &str, tail: &str) -> String {
        format!(
            r#"<html><body><div class="timeline">{items}{tail}</div></body></html>"#
        )
    }

    const SHOW_MORE: &str =
        r#"<div class="show-more"><a href="?cursor=DAABCgABF">Load more</a></div>"#;

    fn full_item() -> &'static str {
        r#"<div class="timeline-item">
            <a class="tweet-link" href="/user/status/123#m"></a>
            <div class="tweet-body">
              <div class="tweet-header">
                <a class="fullname" href="/user" title="Some User">Some User</a>
                <span class="tweet-date"><a href="/user/status/123#m" title="Nov 1, 2022 · 4:34 PM UTC">Nov 1</a></span>
              </div>
              <div class="tweet-content media-body" dir="auto">Hello &amp; <a href="/other">@other</a> world</div>
              <div class="attachments">
                <div class="gallery-row">
                  <a class="still-image" href="/pic/orig/media%2Fa.jpg"><img src="/pic/a.jpg"></a>
                  <a class="still-image" href="/pic/orig/media%2Fb.jpg"><img src="/pic/b.jpg"></a>
                </div>
                <div class="gallery-gif"><video class="gif"><source src="/pic/video.twimg.com%2Fg.mp4" type="video/mp4"></video></div>
                <div class="gallery-video"><div class="video-container">
                  <video poster="/pic/y.jpg" data-url="/video/x.m3u8"></video>
                </div></div>
              </div>
            </div>
          </div>"#
    }

    fn extractor() -> MarkupExtractor {
        MarkupExtractor::new().unwrap()
    }

    #[test]
    fn test_extract_full_item() {
        let html = page(full_item(), SHOW_MORE);
        let result = extractor()
            .extract(&html, &mirror(), FetchSource::Media)
            .unwrap();

        assert_eq!(result.posts.len(), 1);
        let post = &result.posts[0];
        assert_eq!(post.link, "https://m.example/user/status/123#m");
        assert_eq!(post.author_fullname, "Some User");
        assert_eq!(
            post.timestamp,
            Utc.with_ymd_and_hms(2022, 11, 1, 16, 34, 0).unwrap()
        );
        assert_eq!(post.text_plain, "Hello & @other world");
        assert!(post.text_html.starts_with("Hello &amp; <a href=\"/other\">"));
        assert_eq!(
            post.photo_urls,
            vec![
                "https://m.example/pic/orig/media%2Fa.jpg".to_string(),
                "https://m.example/pic/orig/media%2Fb.jpg".to_string(),
            ]
        );
        assert_eq!(
            post.gif_urls,
            vec!["https://m.example/pic/video.twimg.com%2Fg.mp4".to_string()]
        );
        assert_eq!(post.video_url, "https://m.example/video/x.m3u8");
        assert_eq!(post.videothumb_url, "https://m.example/pic/y.jpg");
        assert_eq!(result.cursor, Some(CrawlCursor::new("?cursor=DAABCgABF")));
    }

    #[test]
    fn test_video_falls_back_to_source_element() {
        let item = r#"<div class="timeline-item"><a class="tweet-link" href="/u/status/9"></a>
            <div class="attachments"><div class="video-container">
              <video poster="/pic/p.jpg"><source src="https://video.twimg.com/v.mp4" type="video/mp4"></video>
            </div></div></div>"#;
        let result = extractor()
            .extract(&page(item, ""), &mirror(), FetchSource::Media)
            .unwrap();

        let post = &result.posts[0];
        assert_eq!(post.video_url, "https://video.twimg.com/v.mp4");
        assert_eq!(post.videothumb_url, "https://m.example/pic/p.jpg");
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let item = r#"<div class="timeline-item"><div class="tweet-body"></div></div>"#;
        let result = extractor()
            .extract(&page(item, ""), &mirror(), FetchSource::Media)
            .unwrap();

        assert_eq!(result.posts, vec![PostRecord::default()]);
        assert!(result.posts[0].is_empty());
        assert_eq!(result.cursor, None);
    }

    #[test]
    fn test_gif_without_source_is_skipped() {
        let item = r#"<div class="timeline-item"><a class="tweet-link" href="/u/status/1"></a>
            <div class="attachments">
              <video class="gif"><source type="video/mp4"></video>
              <video class="gif"><source src="/pic/g2.mp4"></video>
            </div></div>"#;
        let result = extractor()
            .extract(&page(item, ""), &mirror(), FetchSource::Media)
            .unwrap();

        assert_eq!(
            result.posts[0].gif_urls,
            vec!["https://m.example/pic/g2.mp4".to_string()]
        );
    }

    #[test]
    fn test_video_without_urls_is_empty() {
        let item = r#"<div class="timeline-item"><a class="tweet-link" href="/u/status/1"></a>
            <div class="attachments"><div class="video-container"><video></video></div></div></div>"#;
        let result = extractor()
            .extract(&page(item, ""), &mirror(), FetchSource::Media)
            .unwrap();

        assert_eq!(result.posts[0].video_url, "");
        assert_eq!(result.posts[0].videothumb_url, "");
    }

    #[test]
    fn test_search_mode_drops_retweets() {
        let retweet = r#"<div class="timeline-item"><div class="retweet-header">retweeted</div>
            <a class="tweet-link" href="/other/status/2"></a></div>"#;
        let own = r#"<div class="timeline-item"><a class="tweet-link" href="/user/status/3"></a></div>"#;
        let html = page(&format!("{retweet}{own}"), "");

        let search = extractor()
            .extract(&html, &mirror(), FetchSource::Search)
            .unwrap();
        assert_eq!(search.posts.len(), 1);
        assert_eq!(search.posts[0].link, "https://m.example/user/status/3");

        let media = extractor()
            .extract(&html, &mirror(), FetchSource::Media)
            .unwrap();
        assert_eq!(media.posts.len(), 2);
    }

    #[test]
    fn test_show_more_item_is_not_a_post() {
        let top = r#"<div class="timeline-item show-more"><a href="/user/media">Load newest</a></div>"#;
        let own = r#"<div class="timeline-item"><a class="tweet-link" href="/user/status/3"></a></div>"#;
        let html = page(&format!("{top}{own}"), SHOW_MORE);
        let result = extractor()
            .extract(&html, &mirror(), FetchSource::Media)
            .unwrap();

        assert_eq!(result.posts.len(), 1);
        assert!(result.cursor.is_some());
    }

    #[test]
    fn test_show_more_without_items_is_not_a_cursor() {
        let html = page("", SHOW_MORE);
        let result = extractor()
            .extract(&html, &mirror(), FetchSource::Media)
            .unwrap();
        assert!(result.posts.is_empty());
        assert_eq!(result.cursor, None);
    }

    #[test]
    fn test_enable_hls_form_is_a_symptom() {
        let item = r#"<div class="timeline-item"><div class="attachments"><div class="video-overlay">
            <form method="post" action="/enablehls"><button>Enable hls playback</button></form>
            </div></div></div>"#;
        let result = extractor().extract(&page(item, ""), &mirror(), FetchSource::Media);
        assert_eq!(result, Err(PageSymptom::VideoDeliveryDisabled));
    }

    #[test]
    fn test_blank_body_is_unparseable() {
        let ex = extractor();
        assert_eq!(
            ex.extract("", &mirror(), FetchSource::Media),
            Err(PageSymptom::Unparseable)
        );
        assert_eq!(
            ex.extract("   \n", &mirror(), FetchSource::Media),
            Err(PageSymptom::Unparseable)
        );
        assert_eq!(
            ex.extract("plain text, no tags", &mirror(), FetchSource::Media),
            Err(PageSymptom::Unparseable)
        );
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let html = page(full_item(), SHOW_MORE);
        let ex = extractor();
        let first = ex.extract(&html, &mirror(), FetchSource::Search).unwrap();
        let second = ex.extract(&html, &mirror(), FetchSource::Search).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_relative_urls_are_rooted_at_serving_mirror() {
        let html = page(full_item(), SHOW_MORE);
        let other = Mirror::from_host("https", "n.other.example").unwrap();
        let result = extractor()
            .extract(&html, &other, FetchSource::Media)
            .unwrap();
        let post = &result.posts[0];

        let urls = std::iter::once(&post.link)
            .chain(post.photo_urls.iter())
            .chain(post.gif_urls.iter())
            .chain([&post.video_url, &post.videothumb_url]);
        for url in urls {
            assert!(url.starts_with("https://n.other.example/"), "{url}");
        }
    }

    #[test]
    fn test_parse_post_date_example() {
        assert_eq!(
            parse_post_date("Nov 1, 2022 · 4:34 PM UTC").to_rfc3339(),
            "2022-11-01T16:34:00+00:00"
        );
    }

    #[test]
    fn test_parse_post_date_twelve_hour_conversion() {
        let cases = [
            ("12:05 AM", 0),
            ("1:00 AM", 1),
            ("11:59 AM", 11),
            ("12:30 PM", 12),
            ("1:15 PM", 13),
            ("11:00 PM", 23),
        ];
        for (time, hour) in cases {
            let title = format!("Mar 15, 2023 · {time} UTC");
            let parsed = parse_post_date(&title);
            assert_ne!(parsed, DateTime::<Utc>::UNIX_EPOCH, "{title}");
            assert_eq!(parsed.hour(), hour, "{title}");
        }
    }

    #[test]
    fn test_parse_post_date_month_is_case_insensitive() {
        assert_eq!(
            parse_post_date("DEC 31, 2021 · 11:59 PM UTC"),
            Utc.with_ymd_and_hms(2021, 12, 31, 23, 59, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_post_date_malformed_yields_epoch() {
        let cases = [
            "",
            "Foo 1, 2022 · 4:34 PM UTC",
            "Nov 1 2022 · 4:34 PM UTC",
            "Nov 1, 2022 4:34 PM UTC",
            "Nov 1, 2022 · 4:34 PM",
            "Nov 1, 2022 · 4:34 pm UTC",
            "Feb 30, 2022 · 4:34 PM UTC",
            "Nov 1, 2022 · 0:10 AM UTC",
            "Nov 1, 2022 · 13:10 PM UTC",
            "Nov 1, 2022 · 4:34 PM UTC trailing",
        ];
        for title in cases {
            assert_eq!(
                parse_post_date(title),
                DateTime::<Utc>::UNIX_EPOCH,
                "{title:?}"
            );
        }
    }

    #[test]
    fn test_missing_date_title_yields_epoch() {
        let item = r#"<div class="timeline-item"><a class="tweet-link" href="/u/status/1"></a>
            <span class="tweet-date"><a href="/u/status/1">Nov 1</a></span></div>"#;
        let result = extractor()
            .extract(&page(item, ""), &mirror(), FetchSource::Media)
            .unwrap();
        assert_eq!(result.posts[0].timestamp, DateTime::<Utc>::UNIX_EPOCH);
    }
}
