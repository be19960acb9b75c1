use std::time::Duration;

use url::Url;

use crate::error::{GuardError, GuardResult};

/// Result of fetching a URL
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub html: String,
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
}

/// Add `https://` when the input has no scheme.
pub fn normalize_url(url_str: &str) -> GuardResult<Url> {
    let url = if !url_str.starts_with("http://") && !url_str.starts_with("https://") {
        format!("https://{}", url_str)
    } else {
        url_str.to_string()
    };

    Url::parse(&url).map_err(|e| GuardError::Config(format!("Invalid URL: {}", e)))
}

/// Download a page's HTML.
pub async fn fetch_url(url_str: &str) -> GuardResult<FetchResult> {
    let parsed = normalize_url(url_str)?;

    let client = reqwest::Client::builder()
        .user_agent(concat!(
            "Mozilla/5.0 (compatible; newsguard/",
            env!("CARGO_PKG_VERSION"),
            ")"
        ))
        .timeout(Duration::from_secs(15))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| GuardError::Config(format!("Client error: {}", e)))?;

    let response = client
        .get(parsed.as_str())
        .header(
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .header("Accept-Language", "tr-TR,tr;q=0.9,en;q=0.8")
        .send()
        .await
        .map_err(|e| GuardError::Fetch(format!("Request failed: {}", e)))?;

    let status = response.status().as_u16();
    let final_url = response.url().to_string();

    let html = response
        .text()
        .await
        .map_err(|e| GuardError::Fetch(format!("Failed to read body: {}", e)))?;

    log::info!("Fetched {} ({} bytes, HTTP {})", final_url, html.len(), status);

    Ok(FetchResult {
        html,
        url: final_url,
        status,
    })
}
