// src/utils/log.rs

//! Run banners and summaries on top of the `log` facade.

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(60);
    log::info!("{}", border);
    log::info!("  {}", title);
    log::info!("{}", border);
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    log::info!("[SUMMARY] {}", title);
    for (key, value) in items {
        log::info!("    {}: {}", key, value);
    }
}

/// Log a post before its media is fetched.
pub fn post_overview(post: &crate::models::PostRecord) {
    log::debug!("{}", "+".repeat(20));
    log::debug!("{}", post.link);
    log::debug!("By: {}", post.author_fullname);
    log::debug!("At: {}", post.timestamp.to_rfc3339());
    log::debug!("Text: {}", post.text_plain);
    log::debug!("Media files: {}", post.media_count());
    list("Photos", &post.photo_urls);
    list("GIFs", &post.gif_urls);
    log::debug!("Video: {}", display_or_none(&post.video_url));
    log::debug!("Video thumbnail: {}", display_or_none(&post.videothumb_url));
    log::debug!("{}", "+".repeat(20));
}

fn list(label: &str, urls: &[String]) {
    if urls.is_empty() {
        log::debug!("{}: None", label);
        return;
    }
    log::debug!("{}:", label);
    for url in urls {
        log::debug!("* {}", url);
    }
}

fn display_or_none(value: &str) -> &str {
    if value.is_empty() { "None" } else { value }
}
