//! Review aggregation orchestrator
//!
//! Drives the fetch-or-reuse protocol for one keyword: decide whether the
//! cached app list is still good, upsert fresh search results, then walk the
//! apps in rank order refreshing each one's review bands as needed. One
//! app's fetch failure never aborts the run; the store's upsert-by-unique-key
//! semantics make re-runs idempotent.

use crate::catalog::{CatalogFetcher, RatingBand, Review};
use crate::freshness::FreshnessPolicy;
use crate::storage::{AppRecord, Database};
use anyhow::Result;
use chrono::Utc;
use std::time::Duration;

/// Aggregated reviews for one keyword
///
/// An empty outcome (no apps, or no reviews in either band) is a valid
/// terminal state, not an error; callers detect it and report accordingly.
#[derive(Debug, Default)]
pub struct AggregateOutcome {
    pub keyword: String,
    pub apps: Vec<AppRecord>,
    pub low_reviews: Vec<Review>,
    pub high_reviews: Vec<Review>,
}

impl AggregateOutcome {
    pub fn total_low(&self) -> usize {
        self.low_reviews.len()
    }

    pub fn total_high(&self) -> usize {
        self.high_reviews.len()
    }

    /// Whether the run produced nothing to analyze
    pub fn is_empty(&self) -> bool {
        self.low_reviews.is_empty() && self.high_reviews.is_empty()
    }
}

/// Aggregation orchestrator
pub struct Aggregator<'a> {
    db: &'a Database,
    fetcher: &'a dyn CatalogFetcher,
    policy: &'a FreshnessPolicy,
    inter_app_delay: Duration,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        db: &'a Database,
        fetcher: &'a dyn CatalogFetcher,
        policy: &'a FreshnessPolicy,
        inter_app_delay: Duration,
    ) -> Self {
        Self {
            db,
            fetcher,
            policy,
            inter_app_delay,
        }
    }

    /// Aggregate both review bands for a keyword
    ///
    /// `force` invalidates all cached state for the keyword before fetching.
    pub async fn aggregate(
        &self,
        keyword: &str,
        limit: usize,
        country: &str,
        force: bool,
    ) -> Result<AggregateOutcome> {
        if force {
            let purged = self.db.delete_apps_for_keyword(keyword)?;
            tracing::info!(keyword, purged, "forced refresh, cache purged");
        }

        let apps = self.resolve_app_list(keyword, limit, country).await?;

        if apps.is_empty() {
            tracing::info!(keyword, "no apps found");
            return Ok(AggregateOutcome {
                keyword: keyword.to_string(),
                ..Default::default()
            });
        }

        let mut low_reviews = Vec::new();
        let mut high_reviews = Vec::new();

        let app_count = apps.len();
        for (index, app) in apps.iter().enumerate() {
            tracing::info!(
                app = %app.name,
                position = index + 1,
                total = app_count,
                "collecting reviews"
            );

            let needs_fetch = self
                .policy
                .reviews_need_refetch(self.db.latest_review_created_at(app.id)?, Utc::now());

            if needs_fetch {
                low_reviews.extend(self.fetch_band(app, country, RatingBand::Low).await?);
                high_reviews.extend(self.fetch_band(app, country, RatingBand::High).await?);
            } else {
                let cached_low = self.db.reviews_for_app(app.id, RatingBand::Low)?;
                let cached_high = self.db.reviews_for_app(app.id, RatingBand::High)?;
                tracing::debug!(
                    app = %app.name,
                    low = cached_low.len(),
                    high = cached_high.len(),
                    "using cached reviews"
                );
                low_reviews.extend(cached_low);
                high_reviews.extend(cached_high);
            }

            // the upstream service throttles by request rate, not cache state
            if index + 1 < app_count {
                tokio::time::sleep(self.inter_app_delay).await;
            }
        }

        Ok(AggregateOutcome {
            keyword: keyword.to_string(),
            apps,
            low_reviews,
            high_reviews,
        })
    }

    /// Reuse the cached app list when enough recent records exist, otherwise
    /// run a fresh catalog search and upsert the results
    pub async fn resolve_app_list(
        &self,
        keyword: &str,
        limit: usize,
        country: &str,
    ) -> Result<Vec<AppRecord>> {
        let now = Utc::now();
        let recent = self
            .db
            .count_recent_apps(keyword, self.policy.app_list_cutoff(now))?;

        if self.policy.app_list_is_fresh(recent, limit) {
            tracing::info!(keyword, recent, "using cached app list");
            return self.db.apps_for_keyword(keyword, Some(limit));
        }

        tracing::info!(keyword, limit, "searching catalog");
        let summaries = self.fetcher.search(keyword, limit, country).await?;

        let now = Utc::now();
        for summary in &summaries {
            match self.db.get_app(&summary.app_id, keyword)? {
                Some(existing) => {
                    if self.policy.app_record_is_stale(existing.created_at, now) {
                        self.db.update_app_listing(existing.id, summary, now)?;
                    }
                }
                None => {
                    self.db.insert_app(summary, keyword, now)?;
                }
            }
        }

        self.db.apps_for_keyword(keyword, Some(limit))
    }

    /// Fetch one rating band for one app and upsert the results
    ///
    /// Returns an empty vector when the fetch fails; the failure costs this
    /// app its contribution, nothing more. Store rejections of individual
    /// reviews are logged and skipped; validation failures propagate.
    async fn fetch_band(
        &self,
        app: &AppRecord,
        country: &str,
        band: RatingBand,
    ) -> Result<Vec<Review>> {
        let fetched = match self.fetcher.fetch_reviews(&app.app_id, country, band).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(app = %app.name, %band, error = %e, "review fetch failed, skipping");
                return Ok(Vec::new());
            }
        };

        let now = Utc::now();
        let mut saved = Vec::with_capacity(fetched.len());

        for mut review in fetched {
            review.app_name = app.name.clone();

            match self.db.upsert_review(app.id, &review, now) {
                Ok(()) => saved.push(review),
                Err(e) => {
                    if e.downcast_ref::<rusqlite::Error>().is_some() {
                        tracing::warn!(
                            review_id = %review.review_id,
                            error = %e,
                            "review rejected by store, skipping"
                        );
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        tracing::debug!(app = %app.name, %band, count = saved.len(), "reviews saved");
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AppSummary;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockCatalog {
        apps: Vec<AppSummary>,
        reviews: HashMap<String, Vec<Review>>,
        failing_apps: Vec<String>,
        search_calls: AtomicUsize,
        fetch_calls: AtomicUsize,
    }

    impl MockCatalog {
        fn new(apps: Vec<AppSummary>) -> Self {
            Self {
                apps,
                reviews: HashMap::new(),
                failing_apps: Vec::new(),
                search_calls: AtomicUsize::new(0),
                fetch_calls: AtomicUsize::new(0),
            }
        }

        fn with_reviews(mut self, app_id: &str, reviews: Vec<Review>) -> Self {
            self.reviews.insert(app_id.to_string(), reviews);
            self
        }

        fn with_failure(mut self, app_id: &str) -> Self {
            self.failing_apps.push(app_id.to_string());
            self
        }
    }

    #[async_trait]
    impl CatalogFetcher for MockCatalog {
        async fn search(
            &self,
            _keyword: &str,
            limit: usize,
            _country: &str,
        ) -> Result<Vec<AppSummary>> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.apps.iter().take(limit).cloned().collect())
        }

        async fn fetch_reviews(
            &self,
            app_id: &str,
            _country: &str,
            band: RatingBand,
        ) -> Result<Vec<Review>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_apps.iter().any(|id| id == app_id) {
                anyhow::bail!("connection reset");
            }
            Ok(self
                .reviews
                .get(app_id)
                .map(|reviews| {
                    reviews
                        .iter()
                        .filter(|r| band.contains(r.rating))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    fn summary(app_id: &str, rank: usize) -> AppSummary {
        AppSummary {
            app_id: app_id.to_string(),
            name: format!("App {}", app_id),
            developer: None,
            bundle_id: None,
            price: None,
            currency: None,
            rating: Some(4.0),
            rating_count: Some(10),
            version: None,
            description: None,
            icon_url: None,
            search_rank: rank,
        }
    }

    fn review(id: &str, app_id: &str, rating: u8) -> Review {
        Review {
            review_id: id.to_string(),
            app_id: app_id.to_string(),
            app_name: String::new(),
            author: None,
            title: Some("title".to_string()),
            content: Some("content".to_string()),
            rating,
            version: None,
            published_at: None,
        }
    }

    fn aggregator<'a>(
        db: &'a Database,
        fetcher: &'a MockCatalog,
        policy: &'a FreshnessPolicy,
    ) -> Aggregator<'a> {
        Aggregator::new(db, fetcher, policy, Duration::from_millis(0))
    }

    #[tokio::test]
    async fn test_aggregate_collects_both_bands() {
        let db = Database::open_in_memory().unwrap();
        let policy = FreshnessPolicy::default();
        let fetcher = MockCatalog::new(vec![summary("100", 1)]).with_reviews(
            "100",
            vec![
                review("r1", "100", 1),
                review("r2", "100", 2),
                review("r3", "100", 5),
            ],
        );

        let outcome = aggregator(&db, &fetcher, &policy)
            .aggregate("meditation", 1, "us", false)
            .await
            .unwrap();

        assert_eq!(outcome.apps.len(), 1);
        assert_eq!(outcome.total_low(), 2);
        assert_eq!(outcome.total_high(), 1);
        assert!(!outcome.is_empty());
        // reviews are attributed to the app they were fetched for
        assert!(outcome.low_reviews.iter().all(|r| r.app_name == "App 100"));
    }

    #[tokio::test]
    async fn test_empty_search_is_valid_terminal_state() {
        let db = Database::open_in_memory().unwrap();
        let policy = FreshnessPolicy::default();
        let fetcher = MockCatalog::new(Vec::new());

        let outcome = aggregator(&db, &fetcher, &policy)
            .aggregate("nonexistent", 5, "us", false)
            .await
            .unwrap();

        assert!(outcome.apps.is_empty());
        assert!(outcome.is_empty());
    }

    #[tokio::test]
    async fn test_partial_fetch_failure_keeps_loop_alive() {
        let db = Database::open_in_memory().unwrap();
        let policy = FreshnessPolicy::default();

        let apps: Vec<AppSummary> = (1..=5).map(|i| summary(&i.to_string(), i as usize)).collect();
        let mut fetcher = MockCatalog::new(apps);
        for i in 1..=5 {
            let id = i.to_string();
            fetcher = fetcher.with_reviews(
                &id,
                vec![
                    review(&format!("low-{}", i), &id, 1),
                    review(&format!("high-{}", i), &id, 5),
                ],
            );
        }
        let fetcher = fetcher.with_failure("2").with_failure("4");

        let outcome = aggregator(&db, &fetcher, &policy)
            .aggregate("meditation", 5, "us", false)
            .await
            .unwrap();

        // two apps failed; the remaining three contribute one review per band
        assert_eq!(outcome.apps.len(), 5);
        assert_eq!(outcome.total_low(), 3);
        assert_eq!(outcome.total_high(), 3);
    }

    #[tokio::test]
    async fn test_second_run_within_ttl_reuses_cache() {
        let db = Database::open_in_memory().unwrap();
        let policy = FreshnessPolicy::default();
        let fetcher = MockCatalog::new(vec![summary("100", 1)]).with_reviews(
            "100",
            vec![review("r1", "100", 1), review("r2", "100", 4)],
        );

        let agg = aggregator(&db, &fetcher, &policy);
        let first = agg.aggregate("meditation", 1, "us", false).await.unwrap();
        let second = agg.aggregate("meditation", 1, "us", false).await.unwrap();

        // identical results, but the second run never touched the network
        assert_eq!(first.total_low(), second.total_low());
        assert_eq!(first.total_high(), second.total_high());
        assert_eq!(fetcher.search_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.fetch_calls.load(Ordering::SeqCst), 2);

        // and no new review rows appeared
        let app = db.get_app("100", "meditation").unwrap().unwrap();
        assert_eq!(db.count_reviews_for_app(app.id, RatingBand::Low).unwrap(), 1);
        assert_eq!(db.count_reviews_for_app(app.id, RatingBand::High).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_force_purges_and_refetches() {
        let db = Database::open_in_memory().unwrap();
        let policy = FreshnessPolicy::default();
        let fetcher = MockCatalog::new(vec![summary("100", 1)])
            .with_reviews("100", vec![review("r1", "100", 1)]);

        let agg = aggregator(&db, &fetcher, &policy);
        agg.aggregate("meditation", 1, "us", false).await.unwrap();
        agg.aggregate("meditation", 1, "us", true).await.unwrap();

        assert_eq!(fetcher.search_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_duplicate_review_ids_across_runs_not_duplicated() {
        let db = Database::open_in_memory().unwrap();
        // zero-day TTL: reviews are always considered stale, forcing refetch
        let policy = FreshnessPolicy {
            review_ttl_days: 0,
            ..Default::default()
        };
        let fetcher = MockCatalog::new(vec![summary("100", 1)])
            .with_reviews("100", vec![review("r1", "100", 1)]);

        let agg = aggregator(&db, &fetcher, &policy);
        agg.aggregate("meditation", 1, "us", false).await.unwrap();
        agg.aggregate("meditation", 1, "us", false).await.unwrap();

        let app = db.get_app("100", "meditation").unwrap().unwrap();
        assert_eq!(db.count_reviews_for_app(app.id, RatingBand::Low).unwrap(), 1);
        assert_eq!(fetcher.fetch_calls.load(Ordering::SeqCst), 4);
    }
}
