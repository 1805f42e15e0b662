//! Database schema definition

/// SQL schema for the StorePulse database
pub const SCHEMA: &str = r#"
-- Apps discovered by keyword search; one record per (app_id, keyword)
CREATE TABLE IF NOT EXISTS apps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_id TEXT NOT NULL,
    keyword TEXT NOT NULL,
    name TEXT NOT NULL,
    developer TEXT,
    bundle_id TEXT,
    price REAL,
    currency TEXT,
    rating REAL,
    rating_count INTEGER,
    version TEXT,
    description TEXT,
    icon_url TEXT,
    search_rank INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_apps_app_id_keyword ON apps(app_id, keyword);
CREATE INDEX IF NOT EXISTS idx_apps_keyword ON apps(keyword);
CREATE INDEX IF NOT EXISTS idx_apps_app_id ON apps(app_id);

-- Customer reviews; review_id is globally unique across apps
CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_pk INTEGER NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
    review_id TEXT NOT NULL,
    author TEXT,
    title TEXT,
    content TEXT,
    rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
    version TEXT,
    published_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_reviews_review_id ON reviews(review_id);
CREATE INDEX IF NOT EXISTS idx_reviews_app_pk ON reviews(app_pk);
CREATE INDEX IF NOT EXISTS idx_reviews_rating ON reviews(rating);
CREATE INDEX IF NOT EXISTS idx_reviews_published ON reviews(published_at);

-- Keyword-scoped textual analyses; append-only
CREATE TABLE IF NOT EXISTS analyses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword TEXT NOT NULL,
    llm_analysis TEXT,
    shape TEXT NOT NULL DEFAULT 'comprehensive',
    schema_version INTEGER NOT NULL DEFAULT 2,
    patterns TEXT NOT NULL DEFAULT '[]',
    opportunities TEXT NOT NULL DEFAULT '[]',
    total_reviews_analyzed INTEGER NOT NULL DEFAULT 0,
    total_low_reviews_analyzed INTEGER NOT NULL DEFAULT 0,
    total_high_reviews_analyzed INTEGER NOT NULL DEFAULT 0,
    llm_model TEXT,
    personas TEXT NOT NULL DEFAULT '[]',
    raw_persona_extractions TEXT NOT NULL DEFAULT '[]',
    insider_language TEXT NOT NULL DEFAULT '{}',
    keyword_opportunities TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_analyses_keyword ON analyses(keyword);
CREATE INDEX IF NOT EXISTS idx_analyses_created ON analyses(created_at);

-- Per-app screenshot analyses; append-only
CREATE TABLE IF NOT EXISTS screenshot_analyses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_pk INTEGER NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
    screenshot_count INTEGER NOT NULL,
    analysis TEXT NOT NULL,
    screenshot_urls TEXT NOT NULL DEFAULT '[]',
    llm_model TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_screenshot_analyses_app ON screenshot_analyses(app_pk);
CREATE INDEX IF NOT EXISTS idx_screenshot_analyses_created ON screenshot_analyses(created_at);

-- Per-(app, keyword) ASO analyses; append-only
CREATE TABLE IF NOT EXISTS aso_analyses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_pk INTEGER NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
    keyword TEXT NOT NULL,
    competitor_count INTEGER NOT NULL,
    competitor_app_ids TEXT NOT NULL DEFAULT '[]',
    llm_analysis TEXT,
    recommendations TEXT NOT NULL DEFAULT '{}',
    llm_model TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_aso_analyses_app_keyword ON aso_analyses(app_pk, keyword);
CREATE INDEX IF NOT EXISTS idx_aso_analyses_keyword ON aso_analyses(keyword);
CREATE INDEX IF NOT EXISTS idx_aso_analyses_created ON aso_analyses(created_at);
"#;
