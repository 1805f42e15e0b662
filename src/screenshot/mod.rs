//! Screenshot intelligence
//!
//! Per-app screenshot analysis: look up the app's screenshot URLs, download
//! the images, and hand them to the vision model with an analysis prompt.
//! Results are cached per app and reused inside the screenshot TTL.

use crate::catalog::ScreenshotsClient;
use crate::freshness::FreshnessPolicy;
use crate::llm::{prompts, CompletionProvider, CompletionRequest};
use crate::storage::{AppRecord, Database, ScreenshotAnalysisRecord};
use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;

/// Outcome of analyzing one app's screenshots
#[derive(Debug)]
pub enum ScreenshotOutcome {
    /// A fresh cached analysis was reused
    Cached(ScreenshotAnalysisRecord),
    /// A new analysis was produced and stored
    Fresh(ScreenshotAnalysisRecord),
    /// The app had no usable screenshots or details
    Unavailable,
}

impl ScreenshotOutcome {
    pub fn record(&self) -> Option<&ScreenshotAnalysisRecord> {
        match self {
            ScreenshotOutcome::Cached(record) | ScreenshotOutcome::Fresh(record) => Some(record),
            ScreenshotOutcome::Unavailable => None,
        }
    }
}

/// Screenshot analysis orchestrator
pub struct ScreenshotAnalyzer<'a> {
    db: &'a Database,
    llm: &'a dyn CompletionProvider,
    client: &'a ScreenshotsClient,
    policy: &'a FreshnessPolicy,
    model: String,
    temperature: f32,
}

impl<'a> ScreenshotAnalyzer<'a> {
    pub fn new(
        db: &'a Database,
        llm: &'a dyn CompletionProvider,
        client: &'a ScreenshotsClient,
        policy: &'a FreshnessPolicy,
        model: &str,
        temperature: f32,
    ) -> Self {
        Self {
            db,
            llm,
            client,
            policy,
            model: model.to_string(),
            temperature,
        }
    }

    /// Analyze one app's screenshots, reusing a fresh cached record unless
    /// `force` is set
    ///
    /// Failures to look up the app or download any screenshot degrade to
    /// [`ScreenshotOutcome::Unavailable`]; only gateway and store errors
    /// propagate.
    pub async fn analyze_app(&self, app: &AppRecord, force: bool) -> Result<ScreenshotOutcome> {
        if !force {
            if let Some(existing) = self.db.latest_screenshot_analysis(app.id)? {
                if self
                    .policy
                    .screenshot_analysis_is_fresh(existing.created_at, Utc::now())
                {
                    tracing::info!(app = %app.name, "using cached screenshot analysis");
                    return Ok(ScreenshotOutcome::Cached(existing));
                }
            }
        }

        let Some(details) = self.client.fetch_app_details(&app.app_id).await else {
            tracing::warn!(app = %app.name, "app details unavailable");
            return Ok(ScreenshotOutcome::Unavailable);
        };

        if details.screenshot_urls.is_empty() {
            tracing::info!(app = %app.name, "no screenshots listed");
            return Ok(ScreenshotOutcome::Unavailable);
        }

        let mut images = Vec::new();
        let mut analyzed_urls = Vec::new();
        for url in &details.screenshot_urls {
            if let Some(bytes) = self.client.download(url).await {
                images.push(("image/png".to_string(), BASE64.encode(&bytes)));
                analyzed_urls.push(url.clone());
            }
        }

        if images.is_empty() {
            tracing::warn!(app = %app.name, "all screenshot downloads failed");
            return Ok(ScreenshotOutcome::Unavailable);
        }

        tracing::info!(app = %app.name, count = images.len(), "analyzing screenshots");

        let request = CompletionRequest {
            system: prompts::VISION_SYSTEM_PROMPT.to_string(),
            user: prompts::screenshot_analysis_content(&app.name, &images),
            model: self.model.clone(),
            temperature: self.temperature,
        };

        let analysis_text = self.llm.complete(request).await?;

        let id = self.db.insert_screenshot_analysis(
            app.id,
            images.len(),
            &analysis_text,
            &analyzed_urls,
            &self.model,
            Utc::now(),
        )?;

        let record = ScreenshotAnalysisRecord {
            id,
            app_pk: app.id,
            screenshot_count: images.len(),
            analysis: analysis_text,
            screenshot_urls: analyzed_urls,
            llm_model: Some(self.model.clone()),
            created_at: Utc::now(),
        };

        Ok(ScreenshotOutcome::Fresh(record))
    }
}
