//! SQLite storage layer for StorePulse
//!
//! This module handles persistent storage of:
//! - Apps, unique per (app_id, keyword)
//! - Reviews, unique per review_id across all apps
//! - Keyword-scoped textual analyses (append-only)
//! - Per-app screenshot analyses and per-(app, keyword) ASO analyses

mod schema;

pub use schema::SCHEMA;

use crate::analysis::{AnalysisShape, StructuredAnalysis, ANALYSIS_SCHEMA_VERSION};
use crate::catalog::{AppSummary, RatingBand, Review};
use crate::extract::PersonaPhrase;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", path.as_ref()))?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;

        let db = Self { conn };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to initialize database schema")?;
        Ok(())
    }

    // ==================== Apps ====================

    /// Get an app record by its (app_id, keyword) identity
    pub fn get_app(&self, app_id: &str, keyword: &str) -> Result<Option<AppRecord>> {
        let result = self
            .conn
            .query_row(
                &format!("{} WHERE app_id = ?1 AND keyword = ?2", APP_SELECT),
                params![app_id, keyword],
                app_row,
            )
            .optional()
            .context("Failed to get app")?;

        result.map(AppRow::into_record).transpose()
    }

    /// Insert a new app record for a keyword
    pub fn insert_app(
        &self,
        summary: &AppSummary,
        keyword: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn
            .execute(
                r#"
                INSERT INTO apps (
                    app_id, keyword, name, developer, bundle_id, price, currency,
                    rating, rating_count, version, description, icon_url,
                    search_rank, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
                "#,
                params![
                    summary.app_id,
                    keyword,
                    summary.name,
                    summary.developer,
                    summary.bundle_id,
                    summary.price,
                    summary.currency,
                    summary.rating,
                    summary.rating_count,
                    summary.version,
                    summary.description,
                    summary.icon_url,
                    summary.search_rank as i64,
                    to_timestamp(now),
                ],
            )
            .context("Failed to insert app")?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Overwrite an app record's mutable listing fields
    ///
    /// Identity and creation timestamp are preserved.
    pub fn update_app_listing(
        &self,
        id: i64,
        summary: &AppSummary,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn
            .execute(
                r#"
                UPDATE apps SET
                    name = ?1, developer = ?2, bundle_id = ?3, price = ?4,
                    currency = ?5, rating = ?6, rating_count = ?7, version = ?8,
                    description = ?9, icon_url = ?10, search_rank = ?11,
                    updated_at = ?12
                WHERE id = ?13
                "#,
                params![
                    summary.name,
                    summary.developer,
                    summary.bundle_id,
                    summary.price,
                    summary.currency,
                    summary.rating,
                    summary.rating_count,
                    summary.version,
                    summary.description,
                    summary.icon_url,
                    summary.search_rank as i64,
                    to_timestamp(now),
                    id,
                ],
            )
            .context("Failed to update app listing")?;

        Ok(())
    }

    /// Count app records for a keyword created after the cutoff
    pub fn count_recent_apps(&self, keyword: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM apps WHERE keyword = ?1 AND created_at > ?2",
                params![keyword, to_timestamp(cutoff)],
                |row| row.get(0),
            )
            .context("Failed to count recent apps")?;

        Ok(count as usize)
    }

    /// Get app records for a keyword in search-rank order
    pub fn apps_for_keyword(&self, keyword: &str, limit: Option<usize>) -> Result<Vec<AppRecord>> {
        let sql = format!(
            "{} WHERE keyword = ?1 ORDER BY search_rank ASC LIMIT ?2",
            APP_SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = stmt.query_map(params![keyword, limit], app_row)?;

        let mut apps = Vec::new();
        for row in rows {
            apps.push(row?.into_record()?);
        }
        Ok(apps)
    }

    /// Delete all app records for a keyword, cascading to their reviews and
    /// per-app analyses
    pub fn delete_apps_for_keyword(&self, keyword: &str) -> Result<usize> {
        let count = self
            .conn
            .execute("DELETE FROM apps WHERE keyword = ?1", params![keyword])
            .context("Failed to delete apps")?;

        Ok(count)
    }

    // ==================== Reviews ====================

    /// Insert or update a review by its globally unique review_id
    pub fn upsert_review(&self, app_pk: i64, review: &Review, now: DateTime<Utc>) -> Result<()> {
        anyhow::ensure!(
            (1..=5).contains(&review.rating),
            "Review {} has rating {} outside 1..=5",
            review.review_id,
            review.rating
        );

        self.conn
            .execute(
                r#"
                INSERT INTO reviews (
                    app_pk, review_id, author, title, content, rating,
                    version, published_at, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                ON CONFLICT(review_id) DO UPDATE SET
                    app_pk = excluded.app_pk,
                    author = excluded.author,
                    title = excluded.title,
                    content = excluded.content,
                    rating = excluded.rating,
                    version = excluded.version,
                    published_at = excluded.published_at,
                    updated_at = excluded.updated_at
                "#,
                params![
                    app_pk,
                    review.review_id,
                    review.author,
                    review.title,
                    review.content,
                    review.rating as i64,
                    review.version,
                    review.published_at.map(to_timestamp),
                    to_timestamp(now),
                ],
            )
            .context("Failed to upsert review")?;

        Ok(())
    }

    /// Creation time of the newest cached review for an app
    pub fn latest_review_created_at(&self, app_pk: i64) -> Result<Option<DateTime<Utc>>> {
        let result: Option<String> = self
            .conn
            .query_row(
                "SELECT created_at FROM reviews WHERE app_pk = ?1 ORDER BY created_at DESC LIMIT 1",
                params![app_pk],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to get latest review timestamp")?;

        result.map(|ts| parse_timestamp(&ts)).transpose()
    }

    /// Cached reviews for an app, filtered to a rating band
    pub fn reviews_for_app(&self, app_pk: i64, band: RatingBand) -> Result<Vec<Review>> {
        let (lo, hi) = match band {
            RatingBand::Low => (1, 2),
            RatingBand::High => (4, 5),
        };

        let mut stmt = self.conn.prepare(
            r#"
            SELECT r.review_id, a.app_id, a.name, r.author, r.title, r.content,
                   r.rating, r.version, r.published_at
            FROM reviews r
            JOIN apps a ON a.id = r.app_pk
            WHERE r.app_pk = ?1 AND r.rating IN (?2, ?3)
            ORDER BY r.published_at DESC
            "#,
        )?;

        let rows = stmt.query_map(params![app_pk, lo, hi], |row| {
            Ok(ReviewRow {
                review_id: row.get(0)?,
                app_id: row.get(1)?,
                app_name: row.get(2)?,
                author: row.get(3)?,
                title: row.get(4)?,
                content: row.get(5)?,
                rating: row.get(6)?,
                version: row.get(7)?,
                published_at: row.get(8)?,
            })
        })?;

        let mut reviews = Vec::new();
        for row in rows {
            reviews.push(row?.into_review());
        }
        Ok(reviews)
    }

    /// Count cached reviews for an app in a rating band
    pub fn count_reviews_for_app(&self, app_pk: i64, band: RatingBand) -> Result<usize> {
        let (lo, hi) = match band {
            RatingBand::Low => (1, 2),
            RatingBand::High => (4, 5),
        };

        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM reviews WHERE app_pk = ?1 AND rating IN (?2, ?3)",
                params![app_pk, lo, hi],
                |row| row.get(0),
            )
            .context("Failed to count reviews")?;

        Ok(count as usize)
    }

    // ==================== Analyses ====================

    /// Append a new analysis record for a keyword
    ///
    /// The pain point and differentiator collections are mirrored into the
    /// separated patterns/opportunities columns so older readers keep
    /// working.
    pub fn insert_analysis(
        &self,
        keyword: &str,
        analysis: &StructuredAnalysis,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn
            .execute(
                r#"
                INSERT INTO analyses (
                    keyword, llm_analysis, shape, schema_version, patterns,
                    opportunities, total_reviews_analyzed,
                    total_low_reviews_analyzed, total_high_reviews_analyzed,
                    llm_model, personas, raw_persona_extractions,
                    insider_language, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                "#,
                params![
                    keyword,
                    analysis.raw_text,
                    analysis.shape.as_str(),
                    ANALYSIS_SCHEMA_VERSION,
                    serde_json::to_string(&analysis.pain_points)?,
                    serde_json::to_string(&analysis.differentiators)?,
                    analysis.total_reviews_analyzed as i64,
                    analysis.total_low_reviews_analyzed as i64,
                    analysis.total_high_reviews_analyzed as i64,
                    analysis.model,
                    serde_json::to_string(&analysis.personas)?,
                    serde_json::to_string(&analysis.raw_persona_extractions)?,
                    serde_json::to_string(&analysis.insider_language)?,
                    to_timestamp(now),
                ],
            )
            .context("Failed to insert analysis")?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent analysis record for a keyword
    pub fn latest_analysis(&self, keyword: &str) -> Result<Option<AnalysisRecord>> {
        let result = self
            .conn
            .query_row(
                &format!(
                    "{} WHERE keyword = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
                    ANALYSIS_SELECT
                ),
                params![keyword],
                analysis_row,
            )
            .optional()
            .context("Failed to get latest analysis")?;

        result.map(AnalysisRow::into_record).transpose()
    }

    /// Get one analysis record by id
    pub fn get_analysis(&self, id: i64) -> Result<Option<AnalysisRecord>> {
        let result = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1", ANALYSIS_SELECT),
                params![id],
                analysis_row,
            )
            .optional()
            .context("Failed to get analysis")?;

        result.map(AnalysisRow::into_record).transpose()
    }

    /// Recent analysis records for a keyword, newest first
    pub fn analyses_for_keyword(&self, keyword: &str, limit: usize) -> Result<Vec<AnalysisRecord>> {
        let sql = format!(
            "{} WHERE keyword = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
            ANALYSIS_SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![keyword, limit as i64], analysis_row)?;

        let mut analyses = Vec::new();
        for row in rows {
            analyses.push(row?.into_record()?);
        }
        Ok(analyses)
    }

    /// Attach keyword intelligence to an existing analysis record
    pub fn set_keyword_opportunities(&self, id: i64, value: &Map<String, Value>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE analyses SET keyword_opportunities = ?1 WHERE id = ?2",
                params![serde_json::to_string(value)?, id],
            )
            .context("Failed to set keyword opportunities")?;

        Ok(())
    }

    // ==================== Screenshot analyses ====================

    /// Append a screenshot analysis for an app
    pub fn insert_screenshot_analysis(
        &self,
        app_pk: i64,
        screenshot_count: usize,
        analysis: &str,
        screenshot_urls: &[String],
        model: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn
            .execute(
                r#"
                INSERT INTO screenshot_analyses (
                    app_pk, screenshot_count, analysis, screenshot_urls,
                    llm_model, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    app_pk,
                    screenshot_count as i64,
                    analysis,
                    serde_json::to_string(screenshot_urls)?,
                    model,
                    to_timestamp(now),
                ],
            )
            .context("Failed to insert screenshot analysis")?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent screenshot analysis for an app
    pub fn latest_screenshot_analysis(
        &self,
        app_pk: i64,
    ) -> Result<Option<ScreenshotAnalysisRecord>> {
        let result = self
            .conn
            .query_row(
                &format!(
                    "{} WHERE app_pk = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
                    SCREENSHOT_SELECT
                ),
                params![app_pk],
                screenshot_row,
            )
            .optional()
            .context("Failed to get latest screenshot analysis")?;

        result.map(ScreenshotRow::into_record).transpose()
    }

    /// Recent screenshot analyses for an app, newest first
    pub fn screenshot_analyses_for_app(
        &self,
        app_pk: i64,
        limit: usize,
    ) -> Result<Vec<ScreenshotAnalysisRecord>> {
        let sql = format!(
            "{} WHERE app_pk = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
            SCREENSHOT_SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![app_pk, limit as i64], screenshot_row)?;

        let mut analyses = Vec::new();
        for row in rows {
            analyses.push(row?.into_record()?);
        }
        Ok(analyses)
    }

    // ==================== ASO analyses ====================

    /// Append an ASO analysis for an (app, keyword) pair
    #[allow(clippy::too_many_arguments)]
    pub fn insert_aso_analysis(
        &self,
        app_pk: i64,
        keyword: &str,
        competitor_app_ids: &[String],
        llm_analysis: &str,
        recommendations: &Map<String, Value>,
        model: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn
            .execute(
                r#"
                INSERT INTO aso_analyses (
                    app_pk, keyword, competitor_count, competitor_app_ids,
                    llm_analysis, recommendations, llm_model, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    app_pk,
                    keyword,
                    competitor_app_ids.len() as i64,
                    serde_json::to_string(competitor_app_ids)?,
                    llm_analysis,
                    serde_json::to_string(recommendations)?,
                    model,
                    to_timestamp(now),
                ],
            )
            .context("Failed to insert ASO analysis")?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent ASO analysis for an (app, keyword) pair
    pub fn latest_aso_analysis(
        &self,
        app_pk: i64,
        keyword: &str,
    ) -> Result<Option<AsoAnalysisRecord>> {
        let result = self
            .conn
            .query_row(
                r#"
                SELECT id, app_pk, keyword, competitor_count, competitor_app_ids,
                       llm_analysis, recommendations, llm_model, created_at
                FROM aso_analyses
                WHERE app_pk = ?1 AND keyword = ?2
                ORDER BY created_at DESC, id DESC LIMIT 1
                "#,
                params![app_pk, keyword],
                |row| {
                    Ok(AsoRow {
                        id: row.get(0)?,
                        app_pk: row.get(1)?,
                        keyword: row.get(2)?,
                        competitor_count: row.get(3)?,
                        competitor_app_ids: row.get(4)?,
                        llm_analysis: row.get(5)?,
                        recommendations: row.get(6)?,
                        llm_model: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                },
            )
            .optional()
            .context("Failed to get latest ASO analysis")?;

        result.map(AsoRow::into_record).transpose()
    }
}

// ==================== Domain records ====================

/// A cached app, unique per (app_id, keyword)
#[derive(Debug, Clone)]
pub struct AppRecord {
    pub id: i64,
    pub app_id: String,
    pub keyword: String,
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
    pub search_rank: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored textual analysis
#[derive(Debug, Clone)]
pub struct AnalysisRecord {
    pub id: i64,
    pub keyword: String,
    pub llm_analysis: String,
    pub shape: AnalysisShape,
    pub schema_version: i64,
    pub patterns: Vec<Value>,
    pub opportunities: Vec<Value>,
    pub total_reviews_analyzed: usize,
    pub total_low_reviews_analyzed: usize,
    pub total_high_reviews_analyzed: usize,
    pub llm_model: Option<String>,
    pub personas: Vec<Value>,
    pub raw_persona_extractions: Vec<PersonaPhrase>,
    pub insider_language: Map<String, Value>,
    pub keyword_opportunities: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// A stored screenshot analysis
#[derive(Debug, Clone)]
pub struct ScreenshotAnalysisRecord {
    pub id: i64,
    pub app_pk: i64,
    pub screenshot_count: usize,
    pub analysis: String,
    pub screenshot_urls: Vec<String>,
    pub llm_model: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A stored ASO analysis
#[derive(Debug, Clone)]
pub struct AsoAnalysisRecord {
    pub id: i64,
    pub app_pk: i64,
    pub keyword: String,
    pub competitor_count: usize,
    pub competitor_app_ids: Vec<String>,
    pub llm_analysis: String,
    pub recommendations: Map<String, Value>,
    pub llm_model: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ==================== Timestamps ====================

fn to_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in database: {}", raw))
}

// ==================== Internal row types ====================

const APP_SELECT: &str = r#"
    SELECT id, app_id, keyword, name, developer, bundle_id, price, currency,
           rating, rating_count, version, description, icon_url, search_rank,
           created_at, updated_at
    FROM apps
"#;

struct AppRow {
    id: i64,
    app_id: String,
    keyword: String,
    name: String,
    developer: Option<String>,
    bundle_id: Option<String>,
    price: Option<f64>,
    currency: Option<String>,
    rating: Option<f64>,
    rating_count: Option<i64>,
    version: Option<String>,
    description: Option<String>,
    icon_url: Option<String>,
    search_rank: Option<i64>,
    created_at: String,
    updated_at: String,
}

fn app_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AppRow> {
    Ok(AppRow {
        id: row.get(0)?,
        app_id: row.get(1)?,
        keyword: row.get(2)?,
        name: row.get(3)?,
        developer: row.get(4)?,
        bundle_id: row.get(5)?,
        price: row.get(6)?,
        currency: row.get(7)?,
        rating: row.get(8)?,
        rating_count: row.get(9)?,
        version: row.get(10)?,
        description: row.get(11)?,
        icon_url: row.get(12)?,
        search_rank: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

impl AppRow {
    fn into_record(self) -> Result<AppRecord> {
        Ok(AppRecord {
            id: self.id,
            app_id: self.app_id,
            keyword: self.keyword,
            name: self.name,
            developer: self.developer,
            bundle_id: self.bundle_id,
            price: self.price,
            currency: self.currency,
            rating: self.rating,
            rating_count: self.rating_count,
            version: self.version,
            description: self.description,
            icon_url: self.icon_url,
            search_rank: self.search_rank.unwrap_or(0) as usize,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

struct ReviewRow {
    review_id: String,
    app_id: String,
    app_name: String,
    author: Option<String>,
    title: Option<String>,
    content: Option<String>,
    rating: i64,
    version: Option<String>,
    published_at: Option<String>,
}

impl ReviewRow {
    fn into_review(self) -> Review {
        Review {
            review_id: self.review_id,
            app_id: self.app_id,
            app_name: self.app_name,
            author: self.author,
            title: self.title,
            content: self.content,
            rating: self.rating as u8,
            version: self.version,
            published_at: self
                .published_at
                .as_deref()
                .and_then(|ts| parse_timestamp(ts).ok()),
        }
    }
}

const ANALYSIS_SELECT: &str = r#"
    SELECT id, keyword, llm_analysis, shape, schema_version, patterns,
           opportunities, total_reviews_analyzed, total_low_reviews_analyzed,
           total_high_reviews_analyzed, llm_model, personas,
           raw_persona_extractions, insider_language, keyword_opportunities,
           created_at
    FROM analyses
"#;

struct AnalysisRow {
    id: i64,
    keyword: String,
    llm_analysis: Option<String>,
    shape: String,
    schema_version: i64,
    patterns: String,
    opportunities: String,
    total_reviews_analyzed: i64,
    total_low_reviews_analyzed: i64,
    total_high_reviews_analyzed: i64,
    llm_model: Option<String>,
    personas: String,
    raw_persona_extractions: String,
    insider_language: String,
    keyword_opportunities: String,
    created_at: String,
}

fn analysis_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnalysisRow> {
    Ok(AnalysisRow {
        id: row.get(0)?,
        keyword: row.get(1)?,
        llm_analysis: row.get(2)?,
        shape: row.get(3)?,
        schema_version: row.get(4)?,
        patterns: row.get(5)?,
        opportunities: row.get(6)?,
        total_reviews_analyzed: row.get(7)?,
        total_low_reviews_analyzed: row.get(8)?,
        total_high_reviews_analyzed: row.get(9)?,
        llm_model: row.get(10)?,
        personas: row.get(11)?,
        raw_persona_extractions: row.get(12)?,
        insider_language: row.get(13)?,
        keyword_opportunities: row.get(14)?,
        created_at: row.get(15)?,
    })
}

impl AnalysisRow {
    fn into_record(self) -> Result<AnalysisRecord> {
        Ok(AnalysisRecord {
            id: self.id,
            keyword: self.keyword,
            llm_analysis: self.llm_analysis.unwrap_or_default(),
            shape: AnalysisShape::parse(&self.shape),
            schema_version: self.schema_version,
            patterns: serde_json::from_str(&self.patterns).unwrap_or_default(),
            opportunities: serde_json::from_str(&self.opportunities).unwrap_or_default(),
            total_reviews_analyzed: self.total_reviews_analyzed.max(0) as usize,
            total_low_reviews_analyzed: self.total_low_reviews_analyzed.max(0) as usize,
            total_high_reviews_analyzed: self.total_high_reviews_analyzed.max(0) as usize,
            llm_model: self.llm_model,
            personas: serde_json::from_str(&self.personas).unwrap_or_default(),
            raw_persona_extractions: serde_json::from_str(&self.raw_persona_extractions)
                .unwrap_or_default(),
            insider_language: serde_json::from_str(&self.insider_language).unwrap_or_default(),
            keyword_opportunities: serde_json::from_str(&self.keyword_opportunities)
                .unwrap_or_default(),
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

const SCREENSHOT_SELECT: &str = r#"
    SELECT id, app_pk, screenshot_count, analysis, screenshot_urls, llm_model,
           created_at
    FROM screenshot_analyses
"#;

struct ScreenshotRow {
    id: i64,
    app_pk: i64,
    screenshot_count: i64,
    analysis: String,
    screenshot_urls: String,
    llm_model: Option<String>,
    created_at: String,
}

fn screenshot_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScreenshotRow> {
    Ok(ScreenshotRow {
        id: row.get(0)?,
        app_pk: row.get(1)?,
        screenshot_count: row.get(2)?,
        analysis: row.get(3)?,
        screenshot_urls: row.get(4)?,
        llm_model: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl ScreenshotRow {
    fn into_record(self) -> Result<ScreenshotAnalysisRecord> {
        Ok(ScreenshotAnalysisRecord {
            id: self.id,
            app_pk: self.app_pk,
            screenshot_count: self.screenshot_count.max(0) as usize,
            analysis: self.analysis,
            screenshot_urls: serde_json::from_str(&self.screenshot_urls).unwrap_or_default(),
            llm_model: self.llm_model,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct AsoRow {
    id: i64,
    app_pk: i64,
    keyword: String,
    competitor_count: i64,
    competitor_app_ids: String,
    llm_analysis: Option<String>,
    recommendations: String,
    llm_model: Option<String>,
    created_at: String,
}

impl AsoRow {
    fn into_record(self) -> Result<AsoAnalysisRecord> {
        Ok(AsoAnalysisRecord {
            id: self.id,
            app_pk: self.app_pk,
            keyword: self.keyword,
            competitor_count: self.competitor_count.max(0) as usize,
            competitor_app_ids: serde_json::from_str(&self.competitor_app_ids).unwrap_or_default(),
            llm_analysis: self.llm_analysis.unwrap_or_default(),
            recommendations: serde_json::from_str(&self.recommendations).unwrap_or_default(),
            llm_model: self.llm_model,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::assemble_cached;
    use chrono::Duration;

    fn summary(app_id: &str, rank: usize) -> AppSummary {
        AppSummary {
            app_id: app_id.to_string(),
            name: format!("App {}", app_id),
            developer: Some("Dev".to_string()),
            bundle_id: Some(format!("com.example.{}", app_id)),
            price: Some(0.0),
            currency: Some("USD".to_string()),
            rating: Some(4.5),
            rating_count: Some(100),
            version: Some("1.0".to_string()),
            description: Some("desc".to_string()),
            icon_url: None,
            search_rank: rank,
        }
    }

    fn review(id: &str, rating: u8) -> Review {
        Review {
            review_id: id.to_string(),
            app_id: "100".to_string(),
            app_name: String::new(),
            author: Some("author".to_string()),
            title: Some("title".to_string()),
            content: Some("content".to_string()),
            rating,
            version: None,
            published_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_app_identity_per_keyword() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        db.insert_app(&summary("100", 1), "meditation", now).unwrap();
        db.insert_app(&summary("100", 3), "sleep", now).unwrap();

        // same app under two keywords is two independent records
        assert!(db.get_app("100", "meditation").unwrap().is_some());
        assert!(db.get_app("100", "sleep").unwrap().is_some());
        assert!(db.get_app("100", "focus").unwrap().is_none());

        // duplicate identity is rejected
        assert!(db.insert_app(&summary("100", 1), "meditation", now).is_err());
    }

    #[test]
    fn test_update_preserves_created_at() {
        let db = Database::open_in_memory().unwrap();
        let created = Utc::now() - Duration::days(5);

        let id = db.insert_app(&summary("100", 1), "meditation", created).unwrap();

        let mut updated = summary("100", 2);
        updated.name = "Renamed".to_string();
        db.update_app_listing(id, &updated, Utc::now()).unwrap();

        let app = db.get_app("100", "meditation").unwrap().unwrap();
        assert_eq!(app.name, "Renamed");
        assert_eq!(app.search_rank, 2);
        assert_eq!(app.created_at, created);
        assert!(app.updated_at > created);
    }

    #[test]
    fn test_count_recent_apps() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        db.insert_app(&summary("1", 1), "meditation", now).unwrap();
        db.insert_app(&summary("2", 2), "meditation", now - Duration::days(3))
            .unwrap();

        let cutoff = now - Duration::days(2);
        assert_eq!(db.count_recent_apps("meditation", cutoff).unwrap(), 1);
    }

    #[test]
    fn test_review_upsert_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let app_pk = db.insert_app(&summary("100", 1), "meditation", now).unwrap();

        db.upsert_review(app_pk, &review("r1", 1), now).unwrap();
        db.upsert_review(app_pk, &review("r1", 2), now).unwrap();

        let reviews = db.reviews_for_app(app_pk, RatingBand::Low).unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].rating, 2);
        assert_eq!(reviews[0].app_name, "App 100");
    }

    #[test]
    fn test_review_rating_validation() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let app_pk = db.insert_app(&summary("100", 1), "meditation", now).unwrap();

        assert!(db.upsert_review(app_pk, &review("r1", 0), now).is_err());
        assert!(db.upsert_review(app_pk, &review("r2", 6), now).is_err());
    }

    #[test]
    fn test_cascade_delete() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let app_pk = db.insert_app(&summary("100", 1), "meditation", now).unwrap();
        db.upsert_review(app_pk, &review("r1", 1), now).unwrap();
        db.insert_screenshot_analysis(app_pk, 3, "analysis", &[], "m", now)
            .unwrap();

        assert_eq!(db.delete_apps_for_keyword("meditation").unwrap(), 1);
        assert!(db.latest_review_created_at(app_pk).unwrap().is_none());
        assert!(db.latest_screenshot_analysis(app_pk).unwrap().is_none());
    }

    #[test]
    fn test_band_queries_never_return_three_star() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let app_pk = db.insert_app(&summary("100", 1), "meditation", now).unwrap();

        for (id, rating) in [("r1", 1), ("r2", 3), ("r3", 5)] {
            db.upsert_review(app_pk, &review(id, rating), now).unwrap();
        }

        let low = db.reviews_for_app(app_pk, RatingBand::Low).unwrap();
        let high = db.reviews_for_app(app_pk, RatingBand::High).unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(high.len(), 1);
    }

    #[test]
    fn test_analysis_round_trip_through_cache_path() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        let raw = r#"{"summary":"S","table_stakes":[{"feature":"F"}],"total_low_reviews_analyzed":5,"total_high_reviews_analyzed":7}"#;
        let fresh = crate::analysis::assemble_comprehensive(raw, 5, 7, "test-model");
        db.insert_analysis("meditation", &fresh, now).unwrap();

        let record = db.latest_analysis("meditation").unwrap().unwrap();
        assert_eq!(record.shape, AnalysisShape::Comprehensive);

        let reloaded = assemble_cached(&record);
        assert_eq!(reloaded.summary.as_deref(), Some("S"));
        assert_eq!(reloaded.table_stakes, fresh.table_stakes);
        assert_eq!(reloaded.total_reviews_analyzed, 12);
    }

    #[test]
    fn test_analysis_shape_persisted_not_inferred() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        // raw text mentions table_stakes but the record was written as simple;
        // the stored tag wins
        let raw = r#"{"summary":"S","patterns":[],"note":"table_stakes"}"#;
        let fresh = crate::analysis::assemble_simple(raw, 10, "m");
        db.insert_analysis("meditation", &fresh, now).unwrap();

        let record = db.latest_analysis("meditation").unwrap().unwrap();
        assert_eq!(record.shape, AnalysisShape::Simple);
        assert_eq!(record.schema_version, ANALYSIS_SCHEMA_VERSION);
    }

    #[test]
    fn test_keyword_opportunities_update() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        let fresh = crate::analysis::assemble_comprehensive("{}", 1, 1, "m");
        let id = db.insert_analysis("meditation", &fresh, now).unwrap();

        let mut value = Map::new();
        value.insert("suggested_keyword_field".to_string(), serde_json::json!({"keywords": "calm,sleep"}));
        db.set_keyword_opportunities(id, &value).unwrap();

        let record = db.get_analysis(id).unwrap().unwrap();
        assert!(record.keyword_opportunities.contains_key("suggested_keyword_field"));
    }

    #[test]
    fn test_aso_analysis_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let app_pk = db.insert_app(&summary("100", 1), "meditation", now).unwrap();

        let mut recs = Map::new();
        recs.insert("competitive_summary".to_string(), serde_json::json!({"top_3_priorities": ["a"]}));

        let ids = vec!["200".to_string(), "300".to_string()];
        db.insert_aso_analysis(app_pk, "meditation", &ids, "raw", &recs, "m", now)
            .unwrap();

        let record = db.latest_aso_analysis(app_pk, "meditation").unwrap().unwrap();
        assert_eq!(record.competitor_count, 2);
        assert_eq!(record.competitor_app_ids, ids);
        assert!(record.recommendations.contains_key("competitive_summary"));
    }

    #[test]
    fn test_on_disk_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storepulse.db");

        {
            let db = Database::open(&path).unwrap();
            db.insert_app(&summary("100", 1), "meditation", Utc::now())
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert!(db.get_app("100", "meditation").unwrap().is_some());
    }
}
