//! Cache freshness evaluation
//!
//! Every decision about reusing a cached artifact versus refetching it lives
//! here, as pure functions over a [`FreshnessPolicy`]:
//! - App lists: enough recent records for the keyword
//! - Reviews: age of the newest cached review per app
//! - Textual analyses: age plus review-count drift
//! - Screenshot analyses: age only
//! - ASO analyses: age plus competitor-set drift
//!
//! All functions are total and deterministic given their inputs; callers pass
//! `now` explicitly.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// TTLs and drift thresholds governing cache reuse
///
/// The day counts and percentages mirror the upstream service's observed
/// volatility; they are configuration, not constants, so deployments can
/// tune them without a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessPolicy {
    /// Cached app lists are refreshed after this many days
    #[serde(default = "default_app_list_ttl")]
    pub app_list_ttl_days: i64,

    /// Per-app reviews are refetched after this many days
    #[serde(default = "default_review_ttl")]
    pub review_ttl_days: i64,

    /// Textual analyses expire after this many days
    #[serde(default = "default_analysis_ttl")]
    pub analysis_ttl_days: i64,

    /// Review-count drift (percent) beyond which an analysis is stale
    #[serde(default = "default_analysis_drift")]
    pub analysis_drift_pct: f64,

    /// Screenshot analyses expire after this many days
    #[serde(default = "default_screenshot_ttl")]
    pub screenshot_ttl_days: i64,

    /// ASO analyses expire after this many days
    #[serde(default = "default_aso_ttl")]
    pub aso_ttl_days: i64,

    /// Competitor-set drift (percent) beyond which an ASO analysis is stale
    #[serde(default = "default_aso_drift")]
    pub aso_drift_pct: f64,
}

fn default_app_list_ttl() -> i64 {
    2
}

fn default_review_ttl() -> i64 {
    3
}

fn default_analysis_ttl() -> i64 {
    3
}

fn default_analysis_drift() -> f64 {
    10.0
}

fn default_screenshot_ttl() -> i64 {
    7
}

fn default_aso_ttl() -> i64 {
    7
}

fn default_aso_drift() -> f64 {
    20.0
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            app_list_ttl_days: default_app_list_ttl(),
            review_ttl_days: default_review_ttl(),
            analysis_ttl_days: default_analysis_ttl(),
            analysis_drift_pct: default_analysis_drift(),
            screenshot_ttl_days: default_screenshot_ttl(),
            aso_ttl_days: default_aso_ttl(),
            aso_drift_pct: default_aso_drift(),
        }
    }
}

/// Review-count baseline stored with an analysis record
///
/// The shape is decided at write time and carried on the record; a simple
/// analysis only ever recorded one blended count, so drift is evaluated
/// against the blended current count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisBaseline {
    /// Single blended review count
    Simple { total: usize },
    /// Independent low- and high-band counts
    Comprehensive { low: usize, high: usize },
}

/// Percent difference of `current` relative to a stored baseline
///
/// A stored baseline of zero admits no meaningful comparison and is reported
/// as 100% drift, forcing a refresh when no baseline exists.
pub fn percent_drift(stored: usize, current: usize) -> f64 {
    if stored == 0 {
        return 100.0;
    }
    (current as f64 - stored as f64).abs() / stored as f64 * 100.0
}

impl FreshnessPolicy {
    /// Oldest `created_at` an app record may have and still count as recent
    pub fn app_list_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.app_list_ttl_days)
    }

    /// Whether a cached app list can be reused
    ///
    /// Freshness is "do we have enough recent records", not "is the newest
    /// one recent": a partial cache of 3 recent apps does not satisfy a
    /// request for 10.
    pub fn app_list_is_fresh(&self, recent_count: usize, wanted: usize) -> bool {
        recent_count >= wanted
    }

    /// Whether an app record is old enough for its mutable listing fields to
    /// be overwritten by a fresh search result
    pub fn app_record_is_stale(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        created_at < now - Duration::days(self.app_list_ttl_days)
    }

    /// Whether an app's reviews must be refetched
    ///
    /// `latest_created_at` is the creation time of the newest cached review
    /// for the app; `None` means no review was ever cached.
    pub fn reviews_need_refetch(
        &self,
        latest_created_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        match latest_created_at {
            Some(created_at) => created_at < now - Duration::days(self.review_ttl_days),
            None => true,
        }
    }

    /// Whether a stored textual analysis can be reused
    ///
    /// Fresh when it is younger than the analysis TTL and the current review
    /// counts have not drifted beyond the threshold relative to the stored
    /// baseline. Comprehensive baselines check both bands independently;
    /// simple baselines check one blended count.
    pub fn analysis_is_fresh(
        &self,
        created_at: DateTime<Utc>,
        baseline: AnalysisBaseline,
        current_low: usize,
        current_high: usize,
        now: DateTime<Utc>,
    ) -> bool {
        if created_at <= now - Duration::days(self.analysis_ttl_days) {
            return false;
        }

        match baseline {
            AnalysisBaseline::Simple { total } => {
                percent_drift(total, current_low + current_high) <= self.analysis_drift_pct
            }
            AnalysisBaseline::Comprehensive { low, high } => {
                percent_drift(low, current_low) <= self.analysis_drift_pct
                    && percent_drift(high, current_high) <= self.analysis_drift_pct
            }
        }
    }

    /// Whether a stored screenshot analysis can be reused
    ///
    /// Purely time-based; screenshots change rarely and re-scraping them is
    /// comparatively loud.
    pub fn screenshot_analysis_is_fresh(
        &self,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        created_at > now - Duration::days(self.screenshot_ttl_days)
    }

    /// Whether a stored ASO analysis can be reused
    ///
    /// Fresh when younger than the ASO TTL and the competitor set has not
    /// drifted beyond the threshold. A stored competitor count of zero is
    /// always reusable: zero competitors admits no meaningful comparison and
    /// treating it as drift would refresh forever when no competitor data was
    /// ever available.
    pub fn aso_analysis_is_fresh(
        &self,
        created_at: DateTime<Utc>,
        stored_competitors: usize,
        current_competitors: usize,
        now: DateTime<Utc>,
    ) -> bool {
        if created_at <= now - Duration::days(self.aso_ttl_days) {
            return false;
        }
        if stored_competitors == 0 {
            return true;
        }
        percent_drift(stored_competitors, current_competitors) <= self.aso_drift_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FreshnessPolicy {
        FreshnessPolicy::default()
    }

    fn now() -> DateTime<Utc> {
        "2026-08-01T12:00:00Z".parse().unwrap()
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        now() - Duration::days(days)
    }

    #[test]
    fn test_percent_drift() {
        assert_eq!(percent_drift(100, 109), 9.0);
        assert_eq!(percent_drift(100, 111), 11.0);
        assert_eq!(percent_drift(100, 89), 11.0);
        assert_eq!(percent_drift(0, 0), 100.0);
        assert_eq!(percent_drift(0, 500), 100.0);
    }

    #[test]
    fn test_app_list_needs_enough_recent_records() {
        let p = policy();
        assert!(p.app_list_is_fresh(10, 10));
        assert!(p.app_list_is_fresh(12, 10));
        assert!(!p.app_list_is_fresh(9, 10));
        assert!(!p.app_list_is_fresh(0, 1));
    }

    #[test]
    fn test_review_refetch_boundary() {
        let p = policy();
        assert!(p.reviews_need_refetch(None, now()));
        assert!(p.reviews_need_refetch(Some(days_ago(4)), now()));
        assert!(!p.reviews_need_refetch(Some(days_ago(2)), now()));
    }

    #[test]
    fn test_analysis_drift_boundary() {
        let p = policy();
        let baseline = AnalysisBaseline::Comprehensive { low: 100, high: 50 };

        // 9% low drift reuses
        assert!(p.analysis_is_fresh(days_ago(1), baseline, 109, 50, now()));
        // 11% low drift refreshes
        assert!(!p.analysis_is_fresh(days_ago(1), baseline, 111, 50, now()));
        // exactly 10% is still fresh
        assert!(p.analysis_is_fresh(days_ago(1), baseline, 110, 50, now()));
        // high-band drift checked independently
        assert!(!p.analysis_is_fresh(days_ago(1), baseline, 100, 60, now()));
    }

    #[test]
    fn test_analysis_age_overrides_matching_counts() {
        let p = policy();
        let baseline = AnalysisBaseline::Comprehensive { low: 100, high: 50 };
        assert!(!p.analysis_is_fresh(days_ago(4), baseline, 100, 50, now()));
    }

    #[test]
    fn test_analysis_zero_baseline_forces_refresh() {
        let p = policy();
        let baseline = AnalysisBaseline::Comprehensive { low: 0, high: 50 };
        assert!(!p.analysis_is_fresh(days_ago(1), baseline, 0, 50, now()));
    }

    #[test]
    fn test_simple_baseline_uses_blended_count() {
        let p = policy();
        let baseline = AnalysisBaseline::Simple { total: 200 };
        assert!(p.analysis_is_fresh(days_ago(1), baseline, 105, 105, now()));
        assert!(!p.analysis_is_fresh(days_ago(1), baseline, 150, 90, now()));
    }

    #[test]
    fn test_screenshot_ttl() {
        let p = policy();
        assert!(p.screenshot_analysis_is_fresh(days_ago(6), now()));
        assert!(!p.screenshot_analysis_is_fresh(days_ago(8), now()));
    }

    #[test]
    fn test_aso_zero_baseline_always_reused() {
        let p = policy();
        assert!(p.aso_analysis_is_fresh(days_ago(1), 0, 0, now()));
        assert!(p.aso_analysis_is_fresh(days_ago(1), 0, 50, now()));
        // but the TTL still applies
        assert!(!p.aso_analysis_is_fresh(days_ago(8), 0, 0, now()));
    }

    #[test]
    fn test_aso_competitor_drift() {
        let p = policy();
        assert!(p.aso_analysis_is_fresh(days_ago(1), 10, 12, now()));
        assert!(!p.aso_analysis_is_fresh(days_ago(1), 10, 13, now()));
        assert!(!p.aso_analysis_is_fresh(days_ago(1), 10, 7, now()));
    }
}
