//! Customer review feed client
//!
//! Reviews come from the paged customer-review feed, newest first. The feed
//! mixes app metadata into the first entry of a page; entries without a
//! rating are skipped. Only the requested rating band is returned; three-star
//! reviews are dropped by every band.

use super::{RatingBand, Review};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

const FEED_BASE_URL: &str = "https://itunes.apple.com";

/// Client for the customer review feed
pub struct ReviewsClient {
    client: reqwest::Client,
    base_url: String,
    page_delay: Duration,
    max_pages: usize,
}

impl ReviewsClient {
    /// Create a reviews client
    ///
    /// `page_delay` is a flat pause between feed pages to stay under the
    /// service's implicit throttling.
    pub fn new(timeout: Duration, page_delay: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: FEED_BASE_URL.to_string(),
            page_delay,
            max_pages: 10,
        })
    }

    /// Fetch reviews for an app, filtered to one rating band
    ///
    /// Pagination stops at the first empty or failed page; a mid-run page
    /// failure returns whatever was collected so far rather than erroring.
    pub async fn fetch_reviews(
        &self,
        app_id: &str,
        country: &str,
        band: RatingBand,
    ) -> Result<Vec<Review>> {
        let mut all_reviews = Vec::new();

        for page in 1..=self.max_pages {
            let url = format!(
                "{}/{}/rss/customerreviews/page={}/id={}/sortBy=mostRecent/json",
                self.base_url, country, page, app_id
            );

            let entries = match self.fetch_page(&url).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(app_id, page, error = %e, "review page fetch failed");
                    break;
                }
            };

            if entries.is_empty() {
                break;
            }

            for entry in &entries {
                if let Some(review) = parse_review_entry(entry, app_id) {
                    all_reviews.push(review);
                }
            }

            tokio::time::sleep(self.page_delay).await;
        }

        all_reviews.retain(|r| band.contains(r.rating));
        Ok(all_reviews)
    }

    async fn fetch_page(&self, url: &str) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Review feed request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Review feed error: {}", response.status());
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse review feed response")?;

        Ok(feed_entries(&body))
    }
}

/// Pull the entry list out of a feed document
///
/// The feed serializes a single entry as an object rather than a one-element
/// array; both forms are handled.
fn feed_entries(body: &Value) -> Vec<Value> {
    match body.pointer("/feed/entry") {
        Some(Value::Array(entries)) => entries.clone(),
        Some(entry @ Value::Object(_)) => vec![entry.clone()],
        _ => Vec::new(),
    }
}

/// Parse one feed entry into a review, or `None` for non-review entries
///
/// The first entry of a page is often app metadata without a rating; those
/// are skipped. Ratings outside 1..=5 are rejected here so nothing invalid
/// reaches the store.
fn parse_review_entry(entry: &Value, app_id: &str) -> Option<Review> {
    let rating: u8 = label(entry, "im:rating")?.parse().ok()?;
    if !(1..=5).contains(&rating) {
        return None;
    }

    let review_id = label(entry, "id")?;

    Some(Review {
        review_id,
        app_id: app_id.to_string(),
        app_name: String::new(),
        author: entry
            .pointer("/author/name/label")
            .and_then(Value::as_str)
            .map(str::to_string),
        title: label(entry, "title"),
        content: label(entry, "content"),
        rating,
        version: label(entry, "im:version"),
        published_at: label(entry, "updated").and_then(|s| parse_date(&s)),
    })
}

fn label(entry: &Value, key: &str) -> Option<String> {
    entry
        .get(key)
        .and_then(|v| v.get("label"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str, rating: u8) -> Value {
        json!({
            "id": {"label": id},
            "title": {"label": "Love it"},
            "content": {"label": "As a busy mom, this saves my mornings."},
            "im:rating": {"label": rating.to_string()},
            "im:version": {"label": "2.0"},
            "author": {"name": {"label": "jane"}},
            "updated": {"label": "2026-07-20T08:30:00-07:00"}
        })
    }

    #[test]
    fn test_parse_review_entry() {
        let review = parse_review_entry(&entry("r1", 5), "100").unwrap();
        assert_eq!(review.review_id, "r1");
        assert_eq!(review.app_id, "100");
        assert_eq!(review.rating, 5);
        assert_eq!(review.author.as_deref(), Some("jane"));
        assert!(review.published_at.is_some());
    }

    #[test]
    fn test_non_review_entry_skipped() {
        // app-info entries carry no rating
        let info = json!({"id": {"label": "app-info"}, "title": {"label": "Some App"}});
        assert!(parse_review_entry(&info, "100").is_none());
    }

    #[test]
    fn test_out_of_range_rating_rejected() {
        assert!(parse_review_entry(&entry("r2", 0), "100").is_none());
        assert!(parse_review_entry(&entry("r3", 6), "100").is_none());
    }

    #[test]
    fn test_single_entry_object_form() {
        let body = json!({"feed": {"entry": entry("r1", 2)}});
        assert_eq!(feed_entries(&body).len(), 1);

        let body = json!({"feed": {"entry": [entry("r1", 2), entry("r2", 4)]}});
        assert_eq!(feed_entries(&body).len(), 2);

        let body = json!({"feed": {}});
        assert!(feed_entries(&body).is_empty());
    }

    #[test]
    fn test_missing_fields_tolerated() {
        let sparse = json!({
            "id": {"label": "r9"},
            "im:rating": {"label": "1"}
        });
        let review = parse_review_entry(&sparse, "100").unwrap();
        assert!(review.title.is_none());
        assert!(review.content.is_none());
        assert!(review.published_at.is_none());
    }
}
