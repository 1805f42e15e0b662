//! Catalog keyword search client

use super::AppSummary;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

const SEARCH_URL: &str = "https://itunes.apple.com/search";

/// Client for the iTunes search API
pub struct SearchClient {
    client: reqwest::Client,
    base_url: String,
}

impl SearchClient {
    /// Create a search client with the given per-call timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: SEARCH_URL.to_string(),
        })
    }

    /// Search for software matching a keyword
    ///
    /// Results come back in store rank order; `search_rank` is the 1-based
    /// position in that ordering.
    pub async fn search(
        &self,
        keyword: &str,
        limit: usize,
        country: &str,
    ) -> Result<Vec<AppSummary>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("term", keyword),
                ("country", country),
                ("entity", "software"),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await
            .context("Catalog search request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Catalog search error: {}", response.status());
        }

        let body: SearchResponse = response
            .json()
            .await
            .context("Failed to parse catalog search response")?;

        tracing::debug!(results = body.results.len(), keyword, "search complete");

        Ok(body
            .results
            .into_iter()
            .enumerate()
            .map(|(index, raw)| raw.into_summary(index + 1))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RawResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResult {
    track_id: i64,
    track_name: String,
    artist_name: Option<String>,
    bundle_id: Option<String>,
    price: Option<f64>,
    currency: Option<String>,
    average_user_rating: Option<f64>,
    user_rating_count: Option<i64>,
    version: Option<String>,
    description: Option<String>,
    artwork_url512: Option<String>,
    artwork_url100: Option<String>,
}

impl RawResult {
    fn into_summary(self, rank: usize) -> AppSummary {
        AppSummary {
            app_id: self.track_id.to_string(),
            name: self.track_name,
            developer: self.artist_name,
            bundle_id: self.bundle_id,
            price: self.price,
            currency: self.currency,
            rating: self.average_user_rating,
            rating_count: self.user_rating_count,
            version: self.version,
            description: self.description,
            icon_url: self.artwork_url512.or(self.artwork_url100),
            search_rank: rank,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_result_mapping() {
        let json = r#"{
            "trackId": 12345,
            "trackName": "Calm Minds",
            "artistName": "Calm Minds Inc",
            "bundleId": "com.calm.minds",
            "price": 0.0,
            "currency": "USD",
            "averageUserRating": 4.6,
            "userRatingCount": 12034,
            "version": "3.2.1",
            "description": "Guided meditation",
            "artworkUrl100": "https://example.com/icon100.png"
        }"#;

        let raw: RawResult = serde_json::from_str(json).unwrap();
        let summary = raw.into_summary(1);

        assert_eq!(summary.app_id, "12345");
        assert_eq!(summary.name, "Calm Minds");
        assert_eq!(summary.search_rank, 1);
        // falls back to the 100px artwork when no 512px is present
        assert_eq!(
            summary.icon_url.as_deref(),
            Some("https://example.com/icon100.png")
        );
    }

    #[test]
    fn test_empty_results() {
        let body: SearchResponse = serde_json::from_str(r#"{"resultCount":0,"results":[]}"#).unwrap();
        assert!(body.results.is_empty());
    }
}
