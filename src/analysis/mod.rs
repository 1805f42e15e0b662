//! Structured analysis types
//!
//! The assembler ([`assembler`]) produces one output shape regardless of
//! whether it worked from a fresh LLM response or a cached record, so report
//! rendering never needs to know which path ran.

pub mod assembler;

pub use assembler::{
    assemble_cached, assemble_comprehensive, assemble_simple, extract_json_object,
    extract_summary_fallback, strip_code_fences,
};

use crate::extract::PersonaPhrase;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema version written with every new analysis record
pub const ANALYSIS_SCHEMA_VERSION: i64 = 2;

/// Shape of an analysis, decided at write time and stored on the record
///
/// A record is exactly one shape; the shape is never re-inferred from the
/// stored text at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisShape {
    /// Patterns and opportunities from low-rating reviews only
    Simple,
    /// Two-band analysis with table stakes and competitive summary
    Comprehensive,
}

impl AnalysisShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisShape::Simple => "simple",
            AnalysisShape::Comprehensive => "comprehensive",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "simple" => AnalysisShape::Simple,
            _ => AnalysisShape::Comprehensive,
        }
    }
}

impl std::fmt::Display for AnalysisShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assembled analysis, the contract consumed by report rendering
///
/// For the simple shape, `pain_points` holds the pattern entries and
/// `differentiators` holds the opportunity entries; the comprehensive-only
/// collections stay empty. Sub-structures are kept as raw JSON values so
/// they round-trip through the store without field loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredAnalysis {
    /// Raw LLM payload, preserved even when parsing fails
    pub raw_text: String,
    pub shape: AnalysisShape,
    pub summary: Option<String>,
    pub table_stakes: Vec<Value>,
    pub pain_points: Vec<Value>,
    pub differentiators: Vec<Value>,
    pub competitive_summary: Map<String, Value>,
    pub personas: Vec<Value>,
    pub raw_persona_extractions: Vec<PersonaPhrase>,
    pub insider_language: Map<String, Value>,
    pub total_reviews_analyzed: usize,
    pub total_low_reviews_analyzed: usize,
    pub total_high_reviews_analyzed: usize,
    pub model: String,
}

impl StructuredAnalysis {
    /// An analysis with every structured field empty
    pub fn empty(shape: AnalysisShape, raw_text: String, model: &str) -> Self {
        Self {
            raw_text,
            shape,
            summary: None,
            table_stakes: Vec::new(),
            pain_points: Vec::new(),
            differentiators: Vec::new(),
            competitive_summary: Map::new(),
            personas: Vec::new(),
            raw_persona_extractions: Vec::new(),
            insider_language: Map::new(),
            total_reviews_analyzed: 0,
            total_low_reviews_analyzed: 0,
            total_high_reviews_analyzed: 0,
            model: model.to_string(),
        }
    }
}
