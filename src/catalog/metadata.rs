//! Product page metadata scraper
//!
//! Subtitle and promotional text are not exposed by any catalog API; they
//! only exist on the store's product pages. The page markup uses generated
//! class suffixes, so extraction tries a list of selector fallbacks and
//! finally the embedded JSON-LD schema block.
//!
//! The store rate-limits page fetches hard. Requests are spaced by a minimum
//! delay, and rate-limit or timeout responses are retried with exponential
//! backoff up to a bounded count before degrading to an all-null result.

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;

const PAGE_BASE_URL: &str = "https://apps.apple.com";

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const SUBTITLE_SELECTORS: &[&str] = &[
    "h2.subtitle",
    "h2[class*=\"subtitle\"]",
    ".product-header__subtitle",
    "h2.product-header__subtitle",
];

const PROMO_SELECTORS: &[&str] = &[
    "p.attributes",
    ".section--hero .we-truncate__child",
    ".product-hero__editorial-content",
    ".section--hero p",
];

/// Transient scrape failures that are worth retrying
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("rate limited by the store")]
    RateLimited,
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(reqwest::StatusCode),
}

/// Scraped listing metadata for one app
#[derive(Debug, Clone, Default)]
pub struct AppMetadata {
    pub subtitle: Option<String>,
    pub promotional_text: Option<String>,
    /// Whether anything useful was extracted
    pub success: bool,
}

/// HTML scraper for product page metadata
pub struct MetadataScraper {
    client: reqwest::Client,
    base_url: String,
    country: String,
    request_delay: Duration,
    max_retries: usize,
    last_request_at: Option<Instant>,
}

impl MetadataScraper {
    pub fn new(
        country: &str,
        timeout: Duration,
        request_delay: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: PAGE_BASE_URL.to_string(),
            country: country.to_string(),
            request_delay,
            max_retries,
            last_request_at: None,
        })
    }

    /// Fetch listing metadata for one app
    ///
    /// Always returns a result: retry exhaustion and parse failures degrade
    /// to an all-null `AppMetadata` with a logged warning.
    pub async fn fetch_metadata(&mut self, app_id: &str) -> AppMetadata {
        let url = format!("{}/{}/app/id{}", self.base_url, self.country, app_id);

        match self.fetch_with_retry(&url).await {
            Ok(html) => parse_page(&html),
            Err(e) => {
                tracing::warn!(app_id, error = %e, "metadata scrape failed");
                AppMetadata::default()
            }
        }
    }

    async fn fetch_with_retry(&mut self, url: &str) -> Result<String, ScrapeError> {
        let mut attempt = 0;
        loop {
            self.rate_limit().await;

            match self.fetch_once(url).await {
                Ok(html) => return Ok(html),
                Err(e @ (ScrapeError::RateLimited | ScrapeError::Timeout)) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(e);
                    }
                    let backoff = Duration::from_secs(1 << attempt);
                    tracing::debug!(url, attempt, ?backoff, "retrying after {}", e);
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&mut self, url: &str) -> Result<String, ScrapeError> {
        self.last_request_at = Some(Instant::now());

        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ScrapeError::Timeout
                } else {
                    ScrapeError::Http(e)
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ScrapeError::RateLimited);
        }
        if !status.is_success() {
            return Err(ScrapeError::Status(status));
        }

        response.text().await.map_err(ScrapeError::Http)
    }

    async fn rate_limit(&self) {
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < self.request_delay {
                tokio::time::sleep(self.request_delay - elapsed).await;
            }
        }
    }
}

/// Extract subtitle and promotional text from product page markup
fn parse_page(html: &str) -> AppMetadata {
    let document = Html::parse_document(html);

    let mut subtitle = select_first_text(&document, SUBTITLE_SELECTORS);
    let mut promotional_text = select_first_text(&document, PROMO_SELECTORS);

    if subtitle.is_none() || promotional_text.is_none() {
        if let Some((ld_subtitle, ld_promo)) = extract_json_ld(&document) {
            subtitle = subtitle.or(ld_subtitle);
            promotional_text = promotional_text.or(ld_promo);
        }
    }

    let success = subtitle.is_some() || promotional_text.is_some();
    AppMetadata {
        subtitle,
        promotional_text,
        success,
    }
}

fn select_first_text(document: &Html, selectors: &[&str]) -> Option<String> {
    for raw in selectors {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text: String = element.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Pull subtitle and promo text out of the JSON-LD schema block, if present
fn extract_json_ld(document: &Html) -> Option<(Option<String>, Option<String>)> {
    let selector = Selector::parse("script[type=\"application/ld+json\"]").ok()?;

    for script in document.select(&selector) {
        let raw: String = script.text().collect();
        let Ok(data) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };

        let kind = data.get("@type").and_then(Value::as_str);
        if matches!(kind, Some("SoftwareApplication") | Some("MobileApplication")) {
            let subtitle = data
                .get("alternativeHeadline")
                .and_then(Value::as_str)
                .map(str::to_string);
            let promo = data
                .get("description")
                .and_then(Value::as_str)
                .map(|d| d.chars().take(170).collect::<String>());
            return Some((subtitle, promo));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_subtitle_and_promo() {
        let html = r#"
            <html><body>
              <h2 class="subtitle">Meditation made simple</h2>
              <p class="attributes">Start your free trial today.</p>
            </body></html>
        "#;

        let meta = parse_page(html);
        assert_eq!(meta.subtitle.as_deref(), Some("Meditation made simple"));
        assert_eq!(
            meta.promotional_text.as_deref(),
            Some("Start your free trial today.")
        );
        assert!(meta.success);
    }

    #[test]
    fn test_parse_page_generated_class_suffix() {
        let html = r#"<html><body><h2 class="subtitle-svelte-x9y2">Sleep better tonight</h2></body></html>"#;
        let meta = parse_page(html);
        assert_eq!(meta.subtitle.as_deref(), Some("Sleep better tonight"));
    }

    #[test]
    fn test_parse_page_json_ld_fallback() {
        let html = r#"
            <html><head>
              <script type="application/ld+json">
                {"@type": "SoftwareApplication",
                 "alternativeHeadline": "Your pocket therapist",
                 "description": "A calming companion for anxious moments."}
              </script>
            </head><body></body></html>
        "#;

        let meta = parse_page(html);
        assert_eq!(meta.subtitle.as_deref(), Some("Your pocket therapist"));
        assert!(meta.promotional_text.is_some());
        assert!(meta.success);
    }

    #[test]
    fn test_parse_page_empty() {
        let meta = parse_page("<html><body><p>nothing here</p></body></html>");
        assert!(meta.subtitle.is_none());
        assert!(!meta.success);
    }
}
