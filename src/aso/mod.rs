//! ASO and keyword intelligence
//!
//! Compares one app's listing metadata against the competitors ranked for a
//! keyword and asks the LLM for optimization recommendations. Results are
//! cached per (app, keyword); the cache is invalidated by age or by the
//! competitor set drifting, since recommendations lose their grounding when
//! the ranked field changes.

use crate::analysis::{extract_json_object, strip_code_fences};
use crate::catalog::MetadataScraper;
use crate::freshness::FreshnessPolicy;
use crate::llm::{prompts, CompletionProvider, CompletionRequest, ListingProfile};
use crate::storage::{AppRecord, AsoAnalysisRecord, Database};
use anyhow::Result;
use chrono::Utc;
use serde_json::{Map, Value};

/// Outcome of an ASO analysis run
#[derive(Debug)]
pub enum AsoOutcome {
    Cached(AsoAnalysisRecord),
    Fresh(AsoAnalysisRecord),
}

impl AsoOutcome {
    pub fn record(&self) -> &AsoAnalysisRecord {
        match self {
            AsoOutcome::Cached(record) | AsoOutcome::Fresh(record) => record,
        }
    }
}

/// ASO analysis orchestrator
pub struct AsoAnalyzer<'a> {
    db: &'a Database,
    llm: &'a dyn CompletionProvider,
    policy: &'a FreshnessPolicy,
    model: String,
    temperature: f32,
}

impl<'a> AsoAnalyzer<'a> {
    pub fn new(
        db: &'a Database,
        llm: &'a dyn CompletionProvider,
        policy: &'a FreshnessPolicy,
        model: &str,
        temperature: f32,
    ) -> Self {
        Self {
            db,
            llm,
            policy,
            model: model.to_string(),
            temperature,
        }
    }

    /// Produce ASO recommendations for `target` against `competitors`
    ///
    /// The scraper fills in subtitle and promotional text for every listing;
    /// scrape failures degrade to partial profiles rather than aborting.
    pub async fn analyze(
        &self,
        target: &AppRecord,
        competitors: &[AppRecord],
        keyword: &str,
        scraper: &mut MetadataScraper,
        force: bool,
    ) -> Result<AsoOutcome> {
        if !force {
            if let Some(existing) = self.db.latest_aso_analysis(target.id, keyword)? {
                if self.policy.aso_analysis_is_fresh(
                    existing.created_at,
                    existing.competitor_count,
                    competitors.len(),
                    Utc::now(),
                ) {
                    tracing::info!(app = %target.name, keyword, "using cached ASO analysis");
                    return Ok(AsoOutcome::Cached(existing));
                }
            }
        }

        tracing::info!(
            app = %target.name,
            keyword,
            competitors = competitors.len(),
            "scraping listing metadata"
        );

        let target_profile = profile_for(target, scraper).await;
        let mut competitor_profiles = Vec::with_capacity(competitors.len());
        for competitor in competitors {
            competitor_profiles.push(profile_for(competitor, scraper).await);
        }

        let prompt = prompts::aso_recommendations(&target_profile, &competitor_profiles, keyword);
        let request = CompletionRequest::text(
            prompts::ASO_SYSTEM_PROMPT,
            &prompt,
            &self.model,
            self.temperature,
        );

        let raw = self.llm.complete(request).await?;
        let recommendations = parse_recommendations(&raw);

        let competitor_ids: Vec<String> =
            competitors.iter().map(|c| c.app_id.clone()).collect();

        let id = self.db.insert_aso_analysis(
            target.id,
            keyword,
            &competitor_ids,
            &raw,
            &recommendations,
            &self.model,
            Utc::now(),
        )?;

        let record = AsoAnalysisRecord {
            id,
            app_pk: target.id,
            keyword: keyword.to_string(),
            competitor_count: competitor_ids.len(),
            competitor_app_ids: competitor_ids,
            llm_analysis: raw,
            recommendations,
            llm_model: Some(self.model.clone()),
            created_at: Utc::now(),
        };

        Ok(AsoOutcome::Fresh(record))
    }

    /// Extract keyword intelligence from competitor metadata
    ///
    /// Returns the parsed intelligence block; the caller decides where to
    /// attach it.
    pub async fn keyword_intelligence(
        &self,
        apps: &[AppRecord],
        keyword: &str,
        scraper: &mut MetadataScraper,
    ) -> Result<Map<String, Value>> {
        let mut profiles = Vec::with_capacity(apps.len());
        for app in apps {
            profiles.push(profile_for(app, scraper).await);
        }

        let prompt = prompts::keyword_intelligence(&profiles, keyword);
        let request = CompletionRequest::text(
            prompts::ASO_SYSTEM_PROMPT,
            &prompt,
            &self.model,
            self.temperature,
        );

        let raw = self.llm.complete(request).await?;
        Ok(parse_recommendations(&raw))
    }
}

/// Build a listing profile, enriched with scraped metadata
async fn profile_for(app: &AppRecord, scraper: &mut MetadataScraper) -> ListingProfile {
    let metadata = scraper.fetch_metadata(&app.app_id).await;

    ListingProfile {
        name: app.name.clone(),
        rank: app.search_rank,
        subtitle: metadata.subtitle,
        promotional_text: metadata.promotional_text,
        rating: app.rating,
        rating_count: app.rating_count,
        description: app.description.clone(),
    }
}

/// Parse the recommendation object out of a raw LLM response
///
/// Malformed payloads yield an empty map; the raw text is persisted
/// alongside it either way.
fn parse_recommendations(raw: &str) -> Map<String, Value> {
    let content = strip_code_fences(raw);
    extract_json_object(&content)
        .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .and_then(|value| value.as_object().cloned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recommendations() {
        let raw = "```json\n{\"name_recommendations\": {\"suggestions\": [\"a\"]}}\n```";
        let parsed = parse_recommendations(raw);
        assert!(parsed.contains_key("name_recommendations"));
    }

    #[test]
    fn test_parse_recommendations_malformed() {
        assert!(parse_recommendations("not json at all").is_empty());
        assert!(parse_recommendations("{\"broken\": ").is_empty());
    }
}
