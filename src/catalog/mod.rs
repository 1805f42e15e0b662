//! App Store catalog collaborators
//!
//! This module handles all traffic against the public catalog endpoints:
//! - Keyword search (search API)
//! - Customer review feeds, split by rating band
//! - App detail lookup and screenshot downloads
//! - Product page scraping for subtitle/promotional text
//!
//! Everything here is thin I/O glue; staleness decisions and aggregation
//! logic live in [`crate::freshness`] and [`crate::aggregate`].

pub mod metadata;
pub mod reviews;
pub mod screenshots;
pub mod search;

pub use metadata::{AppMetadata, MetadataScraper, ScrapeError};
pub use reviews::ReviewsClient;
pub use screenshots::{AppDetails, ScreenshotsClient};
pub use search::SearchClient;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One app summary returned by a catalog search, in rank order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSummary {
    pub app_id: String,
    pub name: String,
    pub developer: Option<String>,
    pub bundle_id: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<i64>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    /// 1-based position in the search results
    pub search_rank: usize,
}

/// Canonical review value type used across all components
///
/// Fetched reviews, cached reviews loaded from the store, and reviews handed
/// to the extraction engine and the LLM prompts are all this one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    /// Globally unique review identifier from the feed
    pub review_id: String,
    /// Catalog identifier of the reviewed app
    pub app_id: String,
    /// Display name of the reviewed app, attributed by the caller
    pub app_name: String,
    pub author: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    /// Star rating, 1 through 5
    pub rating: u8,
    pub version: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Rating band a review falls into
///
/// Three-star reviews belong to neither band and are never collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingBand {
    /// 1-2 stars: dissatisfied users
    Low,
    /// 4-5 stars: satisfied users
    High,
}

impl RatingBand {
    /// Whether a star rating falls inside this band
    pub fn contains(&self, rating: u8) -> bool {
        match self {
            RatingBand::Low => matches!(rating, 1 | 2),
            RatingBand::High => matches!(rating, 4 | 5),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RatingBand::Low => "low",
            RatingBand::High => "high",
        }
    }
}

impl std::fmt::Display for RatingBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog operations the aggregation orchestrator depends on
///
/// The production implementation is [`AppStoreCatalog`]; tests substitute
/// mocks to exercise cache and failure paths without network access.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    /// Search the catalog for apps matching a keyword, in rank order
    async fn search(&self, keyword: &str, limit: usize, country: &str)
        -> Result<Vec<AppSummary>>;

    /// Fetch reviews for one app, filtered to a rating band
    ///
    /// The returned reviews carry an empty `app_name`; the caller attributes
    /// the app it was fetching for.
    async fn fetch_reviews(
        &self,
        app_id: &str,
        country: &str,
        band: RatingBand,
    ) -> Result<Vec<Review>>;
}

/// Production catalog fetcher combining the search and review clients
pub struct AppStoreCatalog {
    search: SearchClient,
    reviews: ReviewsClient,
}

impl AppStoreCatalog {
    pub fn new(search: SearchClient, reviews: ReviewsClient) -> Self {
        Self { search, reviews }
    }
}

#[async_trait]
impl CatalogFetcher for AppStoreCatalog {
    async fn search(
        &self,
        keyword: &str,
        limit: usize,
        country: &str,
    ) -> Result<Vec<AppSummary>> {
        self.search.search(keyword, limit, country).await
    }

    async fn fetch_reviews(
        &self,
        app_id: &str,
        country: &str,
        band: RatingBand,
    ) -> Result<Vec<Review>> {
        self.reviews.fetch_reviews(app_id, country, band).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_bands() {
        assert!(RatingBand::Low.contains(1));
        assert!(RatingBand::Low.contains(2));
        assert!(!RatingBand::Low.contains(3));
        assert!(!RatingBand::High.contains(3));
        assert!(RatingBand::High.contains(4));
        assert!(RatingBand::High.contains(5));
    }
}
