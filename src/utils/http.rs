// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::Client;

use crate::error::Result;
use crate::models::CrawlerConfig;

/// Create the shared asynchronous HTTP client.
///
/// Only the connect timeout is set on the client; each request carries its
/// own deadline because page fetches and media downloads need very different
/// budgets.
pub fn create_client(config: &CrawlerConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .build()?;
    Ok(client)
}

/// Fetch a page body as text, failing on non-success statuses.
pub async fn fetch_text(client: &Client, url: &str, timeout: Duration) -> Result<String> {
    let text = client
        .get(url)
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(text)
}
