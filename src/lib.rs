//! StorePulse - App Store review intelligence and ASO analysis tool
//!
//! This library provides the core functionality for aggregating App Store
//! listings, reviews, and screenshots for a search keyword, mining them for
//! user personas and insider language, and synthesizing competitive analyses
//! with an LLM. Results are cached in SQLite and reused until stale.

pub mod aggregate;
pub mod analysis;
pub mod aso;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod extract;
pub mod freshness;
pub mod llm;
pub mod screenshot;
pub mod storage;

/// Re-export commonly used types
pub use aggregate::{AggregateOutcome, Aggregator};
pub use analysis::{AnalysisShape, StructuredAnalysis};
pub use catalog::{AppSummary, RatingBand, Review};
pub use config::Config;
pub use freshness::FreshnessPolicy;
pub use storage::Database;

/// Application-wide error type
pub use anyhow::Result;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "storepulse";
