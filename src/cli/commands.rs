//! Command implementations

use crate::aggregate::{AggregateOutcome, Aggregator};
use crate::analysis::{
    assemble_cached, assemble_comprehensive, assemble_simple, extract_json_object,
    strip_code_fences, AnalysisShape, StructuredAnalysis,
};
use crate::aso::AsoAnalyzer;
use crate::catalog::{CatalogFetcher, MetadataScraper, RatingBand, ScreenshotsClient};
use crate::config::Config;
use crate::extract::{PersonaExtraction, PersonaExtractor};
use crate::freshness::AnalysisBaseline;
use crate::llm::{prompts, CompletionProvider, CompletionRequest};
use crate::screenshot::ScreenshotAnalyzer;
use crate::storage::Database;
use anyhow::Result;
use chrono::Utc;
use serde_json::{Map, Value};
use std::time::Duration;

/// Options for the analyze command
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub keyword: String,
    pub limit: usize,
    pub country: String,
    pub model: String,
    pub force: bool,
    pub low_only: bool,
}

/// Aggregate reviews for a keyword and produce a structured analysis
///
/// Reuses a fresh cached analysis when the review counts have not drifted;
/// otherwise submits the aggregated evidence to the LLM and persists the
/// result. An empty aggregation is a fatal precondition for this command.
pub async fn analyze(
    db: &Database,
    fetcher: &dyn CatalogFetcher,
    llm: &dyn CompletionProvider,
    config: &Config,
    opts: &AnalyzeOptions,
) -> Result<StructuredAnalysis> {
    let aggregator = Aggregator::new(
        db,
        fetcher,
        &config.freshness,
        Duration::from_millis(config.pacing.inter_app_delay_ms),
    );

    let outcome = aggregator
        .aggregate(&opts.keyword, opts.limit, &opts.country, opts.force)
        .await?;

    if outcome.is_empty() {
        anyhow::bail!("No reviews found for keyword: {}", opts.keyword);
    }

    println!("\nSummary:");
    println!("- Found {} apps", outcome.apps.len());
    println!(
        "- Collected {} negative reviews (1-2 stars)",
        outcome.total_low()
    );
    println!(
        "- Collected {} positive reviews (4-5 stars)",
        outcome.total_high()
    );

    if opts.low_only {
        run_simple(db, llm, config, &outcome, opts).await
    } else {
        run_comprehensive(db, llm, config, &outcome, opts).await
    }
}

/// Comprehensive two-band analysis with persona and insider-language mining
async fn run_comprehensive(
    db: &Database,
    llm: &dyn CompletionProvider,
    config: &Config,
    outcome: &AggregateOutcome,
    opts: &AnalyzeOptions,
) -> Result<StructuredAnalysis> {
    let cached = db.latest_analysis(&opts.keyword)?;

    if !opts.force {
        if let Some(record) = cached.as_ref() {
            if record.shape == AnalysisShape::Comprehensive {
                let baseline = AnalysisBaseline::Comprehensive {
                    low: record.total_low_reviews_analyzed,
                    high: record.total_high_reviews_analyzed,
                };
                if config.freshness.analysis_is_fresh(
                    record.created_at,
                    baseline,
                    outcome.total_low(),
                    outcome.total_high(),
                    Utc::now(),
                ) {
                    println!(
                        "\nUsing cached analysis from {}",
                        record.created_at.format("%Y-%m-%d %H:%M")
                    );
                    return Ok(assemble_cached(record));
                }
            }
        }
    }

    println!("\nAnalyzing reviews with {}...", opts.model);

    let extractor = PersonaExtractor::new()?;
    let mut all_reviews = outcome.low_reviews.clone();
    all_reviews.extend(outcome.high_reviews.iter().cloned());
    let extraction = extractor.extract(&all_reviews);
    tracing::debug!(
        phrases = extraction.phrases.len(),
        reviews_with_matches = extraction.reviews_with_matches,
        "persona extraction complete"
    );

    let prompt =
        prompts::comprehensive_analysis(&outcome.low_reviews, &outcome.high_reviews, &opts.keyword);
    let raw = llm
        .complete(CompletionRequest::text(
            prompts::ANALYST_SYSTEM_PROMPT,
            &prompt,
            &opts.model,
            config.llm.temperature,
        ))
        .await
        .map_err(|e| anyhow::anyhow!("Analysis failed: {}", e))?;

    let mut analysis =
        assemble_comprehensive(&raw, outcome.total_low(), outcome.total_high(), &opts.model);

    analysis.raw_persona_extractions = extraction.phrases.clone();

    // secondary gateway calls degrade to the cached values, never abort the run
    analysis.personas = match normalize_personas(llm, config, &extraction, opts).await {
        Some(personas) => personas,
        None => cached
            .as_ref()
            .map(|record| record.personas.clone())
            .unwrap_or_default(),
    };

    analysis.insider_language = match mine_insider_language(llm, config, outcome, opts).await {
        Some(block) => block,
        None => cached
            .as_ref()
            .map(|record| record.insider_language.clone())
            .unwrap_or_default(),
    };

    db.insert_analysis(&opts.keyword, &analysis, Utc::now())?;
    tracing::info!(keyword = %opts.keyword, "analysis saved");

    Ok(analysis)
}

/// Single-band pattern/opportunity analysis
async fn run_simple(
    db: &Database,
    llm: &dyn CompletionProvider,
    config: &Config,
    outcome: &AggregateOutcome,
    opts: &AnalyzeOptions,
) -> Result<StructuredAnalysis> {
    if !opts.force {
        if let Some(record) = db.latest_analysis(&opts.keyword)? {
            if record.shape == AnalysisShape::Simple {
                let baseline = AnalysisBaseline::Simple {
                    total: record.total_reviews_analyzed,
                };
                if config.freshness.analysis_is_fresh(
                    record.created_at,
                    baseline,
                    outcome.total_low(),
                    0,
                    Utc::now(),
                ) {
                    println!(
                        "\nUsing cached analysis from {}",
                        record.created_at.format("%Y-%m-%d %H:%M")
                    );
                    return Ok(assemble_cached(&record));
                }
            }
        }
    }

    println!("\nAnalyzing reviews with {}...", opts.model);

    let prompt = prompts::simple_analysis(&outcome.low_reviews, &opts.keyword);
    let raw = llm
        .complete(CompletionRequest::text(
            prompts::ANALYST_SYSTEM_PROMPT,
            &prompt,
            &opts.model,
            config.llm.temperature,
        ))
        .await
        .map_err(|e| anyhow::anyhow!("Analysis failed: {}", e))?;

    let analysis = assemble_simple(&raw, outcome.total_low(), &opts.model);

    db.insert_analysis(&opts.keyword, &analysis, Utc::now())?;
    tracing::info!(keyword = %opts.keyword, "analysis saved");

    Ok(analysis)
}

/// Normalize raw persona phrases into named segments via the gateway
///
/// Returns `None` when no phrases were extracted or the gateway call failed.
async fn normalize_personas(
    llm: &dyn CompletionProvider,
    config: &Config,
    extraction: &PersonaExtraction,
    opts: &AnalyzeOptions,
) -> Option<Vec<Value>> {
    if extraction.phrases.is_empty() {
        return Some(Vec::new());
    }

    let prompt = prompts::persona_normalization(
        extraction.top(prompts::MAX_PHRASES_FOR_NORMALIZATION),
        extraction.reviews_with_matches,
        &opts.keyword,
    );

    match llm
        .complete(CompletionRequest::text(
            prompts::ANALYST_SYSTEM_PROMPT,
            &prompt,
            &opts.model,
            config.llm.temperature,
        ))
        .await
    {
        Ok(raw) => Some(parse_array_response(&raw, "personas")),
        Err(e) => {
            tracing::warn!(error = %e, "persona normalization failed");
            None
        }
    }
}

/// Mine the review sample for insider language via the gateway
async fn mine_insider_language(
    llm: &dyn CompletionProvider,
    config: &Config,
    outcome: &AggregateOutcome,
    opts: &AnalyzeOptions,
) -> Option<Map<String, Value>> {
    let prompt =
        prompts::insider_language(&outcome.low_reviews, &outcome.high_reviews, &opts.keyword);

    match llm
        .complete(CompletionRequest::text(
            prompts::ANALYST_SYSTEM_PROMPT,
            &prompt,
            &opts.model,
            config.llm.temperature,
        ))
        .await
    {
        Ok(raw) => Some(parse_object_response(&raw)),
        Err(e) => {
            tracing::warn!(error = %e, "insider language mining failed");
            None
        }
    }
}

fn parse_object_response(raw: &str) -> Map<String, Value> {
    let content = strip_code_fences(raw);
    extract_json_object(&content)
        .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .and_then(|value| value.as_object().cloned())
        .unwrap_or_default()
}

fn parse_array_response(raw: &str, key: &str) -> Vec<Value> {
    parse_object_response(raw)
        .remove(key)
        .and_then(|value| value.as_array().cloned())
        .unwrap_or_default()
}

// ==================== screenshots ====================

/// Analyze screenshots of the top apps for a keyword
pub async fn screenshots(
    db: &Database,
    fetcher: &dyn CatalogFetcher,
    llm: &dyn CompletionProvider,
    client: &ScreenshotsClient,
    config: &Config,
    keyword: &str,
    limit: usize,
    country: &str,
    force: bool,
) -> Result<()> {
    let aggregator = Aggregator::new(
        db,
        fetcher,
        &config.freshness,
        Duration::from_millis(config.pacing.inter_app_delay_ms),
    );

    let apps = aggregator.resolve_app_list(keyword, limit, country).await?;
    if apps.is_empty() {
        anyhow::bail!("No apps found for keyword: {}", keyword);
    }

    let analyzer = ScreenshotAnalyzer::new(
        db,
        llm,
        client,
        &config.freshness,
        &config.llm.vision_model,
        config.llm.temperature,
    );

    let total = apps.len();
    for (index, app) in apps.iter().enumerate() {
        println!("\n[{}/{}] {} ({})", index + 1, total, app.name, app.app_id);

        match analyzer.analyze_app(app, force).await {
            Ok(outcome) => match outcome.record() {
                Some(record) => {
                    println!("Screenshots analyzed: {}", record.screenshot_count);
                    println!("\n{}", record.analysis);
                }
                None => println!("No screenshot analysis available for this app"),
            },
            Err(e) => {
                tracing::warn!(app = %app.name, error = %e, "screenshot analysis failed");
                println!("Error: {}", e);
            }
        }

        if index + 1 < total {
            tokio::time::sleep(Duration::from_millis(config.pacing.inter_app_delay_ms)).await;
        }
    }

    println!("\nScreenshot analysis complete");
    Ok(())
}

// ==================== aso ====================

/// Generate ASO recommendations for one cached app against its competitors
pub async fn aso(
    db: &Database,
    llm: &dyn CompletionProvider,
    scraper: &mut MetadataScraper,
    config: &Config,
    keyword: &str,
    app_id: &str,
    force: bool,
) -> Result<()> {
    let apps = db.apps_for_keyword(keyword, None)?;
    if apps.is_empty() {
        anyhow::bail!(
            "No cached apps for keyword: {}. Run 'analyze {}' first.",
            keyword,
            keyword
        );
    }

    let Some(target) = apps.iter().find(|app| app.app_id == app_id) else {
        anyhow::bail!("App {} is not cached for keyword: {}", app_id, keyword);
    };

    let competitors: Vec<_> = apps
        .iter()
        .filter(|app| app.app_id != app_id)
        .cloned()
        .collect();

    let analyzer = AsoAnalyzer::new(
        db,
        llm,
        &config.freshness,
        &config.llm.aso_model,
        config.llm.temperature,
    );

    let outcome = analyzer
        .analyze(target, &competitors, keyword, scraper, force)
        .await?;
    let record = outcome.record();

    println!("\nASO Recommendations for {}", target.name);
    println!("{}", "=".repeat(50));
    println!("Competitors analyzed: {}", record.competitor_count);

    if let Some(summary) = record.recommendations.get("competitive_summary") {
        if let Some(position) = summary.get("your_current_position").and_then(Value::as_str) {
            println!("\nCurrent position: {}", position);
        }
        if let Some(priorities) = summary.get("top_3_priorities").and_then(Value::as_array) {
            println!("\nTop priorities:");
            for (index, priority) in priorities.iter().take(3).enumerate() {
                println!("  {}. {}", index + 1, priority.as_str().unwrap_or(""));
            }
        }
    }

    if record.recommendations.is_empty() {
        println!("\nNo structured recommendations; raw analysis follows:\n");
        println!("{}", record.llm_analysis);
    } else {
        println!(
            "\nFull recommendations:\n{}",
            serde_json::to_string_pretty(&record.recommendations)?
        );
    }

    Ok(())
}

// ==================== keywords ====================

/// Extract keyword intelligence from the cached competitors of a keyword
pub async fn keywords(
    db: &Database,
    llm: &dyn CompletionProvider,
    scraper: &mut MetadataScraper,
    config: &Config,
    keyword: &str,
) -> Result<()> {
    let apps = db.apps_for_keyword(keyword, None)?;
    if apps.is_empty() {
        anyhow::bail!(
            "No cached apps for keyword: {}. Run 'analyze {}' first.",
            keyword,
            keyword
        );
    }

    let analyzer = AsoAnalyzer::new(
        db,
        llm,
        &config.freshness,
        &config.llm.aso_model,
        config.llm.temperature,
    );

    println!("Mining keyword intelligence from {} apps...", apps.len());
    let intelligence = analyzer.keyword_intelligence(&apps, keyword, scraper).await?;

    if let Some(record) = db.latest_analysis(keyword)? {
        db.set_keyword_opportunities(record.id, &intelligence)?;
        tracing::info!(analysis_id = record.id, "keyword intelligence attached");
    }

    println!("\nKeyword Intelligence for '{}'", keyword);
    println!("{}", "=".repeat(50));

    if let Some(field) = intelligence.get("suggested_keyword_field") {
        if let Some(suggested) = field.get("keywords").and_then(Value::as_str) {
            println!("\nSuggested keyword field: {}", suggested);
        }
        if let Some(rationale) = field.get("rationale").and_then(Value::as_str) {
            println!("Rationale: {}", rationale);
        }
    }

    if let Some(frequent) = intelligence
        .get("high_frequency_keywords")
        .and_then(Value::as_array)
    {
        println!("\nHigh-frequency keywords:");
        for entry in frequent.iter().take(10) {
            println!(
                "  - {} ({} competitors)",
                entry.get("keyword").and_then(Value::as_str).unwrap_or(""),
                entry
                    .get("competitor_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0)
            );
        }
    }

    if let Some(gaps) = intelligence.get("keyword_gaps").and_then(Value::as_array) {
        println!("\nKeyword gaps:");
        for entry in gaps.iter().take(5) {
            println!(
                "  - {}: {}",
                entry.get("keyword").and_then(Value::as_str).unwrap_or(""),
                entry
                    .get("opportunity_note")
                    .and_then(Value::as_str)
                    .unwrap_or("")
            );
        }
    }

    if intelligence.is_empty() {
        println!("\nNo structured intelligence could be parsed from the response.");
    }

    Ok(())
}

// ==================== history / show / apps ====================

/// Show past analyses for a keyword
pub fn history(db: &Database, keyword: &str) -> Result<()> {
    let analyses = db.analyses_for_keyword(keyword, 10)?;

    if analyses.is_empty() {
        anyhow::bail!("No analysis history found for keyword: {}", keyword);
    }

    println!("\nAnalysis History for '{}'", keyword);
    println!("{}", "=".repeat(50));

    for (index, record) in analyses.iter().enumerate() {
        println!(
            "\n{}. #{} {} ({})",
            index + 1,
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.shape
        );
        println!("   Reviews analyzed: {}", record.total_reviews_analyzed);
        println!(
            "   Model: {}",
            record.llm_model.as_deref().unwrap_or("unknown")
        );

        if !record.patterns.is_empty() {
            println!("   Patterns found: {}", record.patterns.len());
        }
        if !record.opportunities.is_empty() {
            println!("   Opportunities: {}", record.opportunities.len());
        }
        if !record.personas.is_empty() {
            println!("   Personas: {}", record.personas.len());
        }
    }

    Ok(())
}

/// Show one analysis by id
pub fn show(db: &Database, id: i64, format: super::OutputFormat) -> Result<()> {
    let Some(record) = db.get_analysis(id)? else {
        anyhow::bail!("Analysis not found with id: {}", id);
    };

    let analysis = assemble_cached(&record);

    match format {
        super::OutputFormat::Json => print_analysis_json(&analysis)?,
        super::OutputFormat::Text => print_analysis_text(&analysis),
    }

    Ok(())
}

/// List cached apps for a keyword
pub fn apps(db: &Database, keyword: &str) -> Result<()> {
    let apps = db.apps_for_keyword(keyword, None)?;

    if apps.is_empty() {
        anyhow::bail!(
            "No cached apps found for keyword: {}. Run 'analyze {}' first.",
            keyword,
            keyword
        );
    }

    println!("\nApps for '{}'", keyword);
    println!("{}", "=".repeat(50));

    for app in &apps {
        let low_cached = db.count_reviews_for_app(app.id, RatingBand::Low)?;
        let high_cached = db.count_reviews_for_app(app.id, RatingBand::High)?;

        println!("\n{}. {}", app.search_rank, app.name);
        println!(
            "   Developer: {}",
            app.developer.as_deref().unwrap_or("unknown")
        );
        println!(
            "   Rating: {:.1}/5 ({} ratings)",
            app.rating.unwrap_or(0.0),
            app.rating_count.unwrap_or(0)
        );
        println!(
            "   Reviews cached: {} negative, {} positive",
            low_cached, high_cached
        );
    }

    Ok(())
}

// ==================== display ====================

fn item_str<'v>(item: &'v Value, key: &str) -> &'v str {
    item.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Print an analysis as JSON
pub fn print_analysis_json(analysis: &StructuredAnalysis) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(analysis)?);
    Ok(())
}

/// Print an analysis as a console report
pub fn print_analysis_text(analysis: &StructuredAnalysis) {
    match analysis.shape {
        AnalysisShape::Comprehensive => print_comprehensive(analysis),
        AnalysisShape::Simple => print_simple(analysis),
    }
}

fn print_comprehensive(analysis: &StructuredAnalysis) {
    println!("\nComprehensive Analysis Results");
    println!("{}", "=".repeat(50));

    if let Some(summary) = &analysis.summary {
        println!("\nExecutive Summary:");
        println!("{}", summary);
    }

    if !analysis.table_stakes.is_empty() {
        println!("\nTable Stakes Features (What You Need to Fit In):");
        for (index, stake) in analysis.table_stakes.iter().enumerate() {
            println!("\n{}. {}", index + 1, item_str(stake, "feature"));
            println!("   {}", item_str(stake, "description"));
            let evidence = item_str(stake, "evidence");
            if !evidence.is_empty() {
                println!("   Evidence: {}", evidence);
            }
        }
    }

    if !analysis.pain_points.is_empty() {
        println!("\nCommon Pain Points:");
        for (index, pain) in analysis.pain_points.iter().enumerate() {
            println!("\n{}. {}", index + 1, item_str(pain, "category"));
            println!("   {}", item_str(pain, "description"));
            let frequency = item_str(pain, "frequency");
            if !frequency.is_empty() {
                println!("   Frequency: {}", frequency);
            }
        }
    }

    if !analysis.differentiators.is_empty() {
        println!("\nDifferentiation Opportunities:");
        for (index, diff) in analysis.differentiators.iter().enumerate() {
            println!("\n{}. {}", index + 1, item_str(diff, "opportunity"));
            println!("   {}", item_str(diff, "description"));
            let rationale = item_str(diff, "rationale");
            if !rationale.is_empty() {
                println!("   Rationale: {}", rationale);
            }
        }
    }

    if !analysis.competitive_summary.is_empty() {
        println!("\nCompetitive Positioning Summary:");
        println!("{}", "=".repeat(40));

        if let Some(stakes) = analysis
            .competitive_summary
            .get("top_3_table_stakes")
            .and_then(Value::as_array)
        {
            println!("\nTop 3 Features to FIT IN (Table Stakes):");
            for (index, feature) in stakes.iter().enumerate() {
                println!("   {}. {}", index + 1, feature.as_str().unwrap_or(""));
            }
        }

        if let Some(diffs) = analysis
            .competitive_summary
            .get("top_3_differentiators")
            .and_then(Value::as_array)
        {
            println!("\nTop 3 Features to STAND OUT (Differentiators):");
            for (index, feature) in diffs.iter().enumerate() {
                println!("   {}. {}", index + 1, feature.as_str().unwrap_or(""));
            }
        }
    }

    if !analysis.personas.is_empty() {
        println!("\nUser Personas:");
        for (index, persona) in analysis.personas.iter().enumerate() {
            println!("\n{}. {}", index + 1, item_str(persona, "name"));
            println!("   {}", item_str(persona, "description"));
            if let Some(mentions) = persona.get("total_mentions").and_then(Value::as_u64) {
                println!("   Mentions: {}", mentions);
            }
        }
    }

    if let Some(terms) = analysis.insider_language.get("terms").and_then(Value::as_array) {
        if !terms.is_empty() {
            println!("\nInsider Language:");
            for term in terms {
                println!(
                    "  - {}: {}",
                    item_str(term, "term"),
                    item_str(term, "meaning")
                );
            }
        }
        if let Some(maturity) = analysis
            .insider_language
            .get("community_maturity")
            .and_then(Value::as_str)
        {
            println!("\nCommunity maturity: {}", maturity);
        }
    }

    println!("\n{}", "=".repeat(50));
    println!(
        "Low-rating reviews analyzed: {}",
        analysis.total_low_reviews_analyzed
    );
    println!(
        "High-rating reviews analyzed: {}",
        analysis.total_high_reviews_analyzed
    );
    println!("Total reviews analyzed: {}", analysis.total_reviews_analyzed);
    println!("Model used: {}", analysis.model);
}

fn print_simple(analysis: &StructuredAnalysis) {
    println!("\nAnalysis Results");
    println!("{}", "=".repeat(50));

    if let Some(summary) = &analysis.summary {
        println!("\nSummary:");
        println!("{}", summary);
    }

    if !analysis.pain_points.is_empty() {
        println!("\nCommon Patterns:");
        for (index, pattern) in analysis.pain_points.iter().enumerate() {
            println!("\n{}. {}", index + 1, item_str(pattern, "category"));
            println!("   {}", item_str(pattern, "description"));
            let frequency = item_str(pattern, "frequency");
            if !frequency.is_empty() {
                println!("   Frequency: {}", frequency);
            }
        }
    }

    if !analysis.differentiators.is_empty() {
        println!("\nOpportunities:");
        for (index, opportunity) in analysis.differentiators.iter().enumerate() {
            let priority = item_str(opportunity, "priority");
            if priority.is_empty() {
                println!("\n{}. {}", index + 1, item_str(opportunity, "title"));
            } else {
                println!(
                    "\n{}. {} (Priority: {})",
                    index + 1,
                    item_str(opportunity, "title"),
                    priority
                );
            }
            println!("   {}", item_str(opportunity, "description"));
        }
    }

    println!("\n{}", "=".repeat(50));
    println!("Reviews analyzed: {}", analysis.total_reviews_analyzed);
    println!("Model used: {}", analysis.model);
}
