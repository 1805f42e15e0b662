//! Analysis assembly from LLM output and cached records
//!
//! Two code paths converge on [`StructuredAnalysis`]:
//! - Fresh: the gateway's raw text is fence-stripped, the first balanced
//!   JSON object is parsed, and recognized keys are mapped field-by-field.
//! - Cache reuse: the same extraction runs against a stored record's raw
//!   text (older records may predate some fields), falling back to the
//!   record's separated pattern/opportunity columns, and finally to a regex
//!   summary extraction when parsing fails entirely.
//!
//! Parse failures never surface to the caller; they yield the same shape
//! with empty structured fields and the raw text preserved.

use super::{AnalysisShape, StructuredAnalysis};
use crate::storage::AnalysisRecord;
use regex::Regex;
use serde_json::{Map, Value};

/// Remove markdown code fence lines from a response
pub fn strip_code_fences(text: &str) -> String {
    if !text.contains("```") {
        return text.to_string();
    }

    text.lines()
        .filter(|line| {
            let trimmed = line.trim();
            trimmed != "```" && trimmed != "```json"
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Locate the first balanced `{...}` object in a text
///
/// Brace tracking is string-aware so braces inside JSON string values do not
/// unbalance the scan. Returns `None` when no complete object exists.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &byte) in text.as_bytes().iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Recover a summary from unparseable analysis text
///
/// Matches a `"summary": "..."` key directly and unescapes backslash
/// sequences. Secondary recovery path for records whose embedded JSON no
/// longer parses.
pub fn extract_summary_fallback(text: &str) -> Option<String> {
    let pattern = Regex::new(r#""summary"\s*:\s*"((?:[^"\\]|\\.)*)""#).ok()?;
    let raw = pattern.captures(text)?.get(1)?.as_str();

    let unescape = Regex::new(r"\\(.)").ok()?;
    Some(unescape.replace_all(raw, "$1").into_owned())
}

fn parse_embedded_json(content: &str) -> Option<Value> {
    extract_json_object(content).and_then(|candidate| serde_json::from_str(candidate).ok())
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn array_field(value: &Value, key: &str) -> Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn map_field(value: &Value, key: &str) -> Map<String, Value> {
    value
        .get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn count_field(value: &Value, key: &str) -> Option<usize> {
    value.get(key).and_then(Value::as_u64).map(|n| n as usize)
}

/// Assemble a comprehensive analysis from a fresh LLM response
pub fn assemble_comprehensive(
    raw_text: &str,
    low_count: usize,
    high_count: usize,
    model: &str,
) -> StructuredAnalysis {
    let content = strip_code_fences(raw_text);
    let parsed = parse_embedded_json(&content);

    let mut analysis = StructuredAnalysis::empty(AnalysisShape::Comprehensive, content, model);

    if let Some(value) = parsed {
        analysis.summary = str_field(&value, "summary");
        analysis.table_stakes = array_field(&value, "table_stakes");
        analysis.pain_points = array_field(&value, "pain_points");
        analysis.differentiators = array_field(&value, "differentiators");
        analysis.competitive_summary = map_field(&value, "competitive_summary");
    }

    analysis.total_low_reviews_analyzed = low_count;
    analysis.total_high_reviews_analyzed = high_count;
    analysis.total_reviews_analyzed = low_count + high_count;
    analysis
}

/// Assemble a simple (single band) analysis from a fresh LLM response
pub fn assemble_simple(raw_text: &str, review_count: usize, model: &str) -> StructuredAnalysis {
    let content = strip_code_fences(raw_text);
    let parsed = parse_embedded_json(&content);

    let mut analysis = StructuredAnalysis::empty(AnalysisShape::Simple, content, model);

    if let Some(value) = parsed {
        analysis.summary = str_field(&value, "summary");
        analysis.pain_points = array_field(&value, "patterns");
        analysis.differentiators = array_field(&value, "opportunities");
    }

    analysis.total_reviews_analyzed = review_count;
    analysis
}

/// Re-assemble an analysis from a stored record
///
/// The record's raw text is authoritative for the structured fields; the
/// separated columns and the regex summary fallback cover records persisted
/// before certain fields existed or whose JSON no longer parses.
pub fn assemble_cached(record: &AnalysisRecord) -> StructuredAnalysis {
    let content = strip_code_fences(&record.llm_analysis);
    let parsed = parse_embedded_json(&content);

    let model = record.llm_model.as_deref().unwrap_or("");
    let mut analysis = StructuredAnalysis::empty(record.shape, content.clone(), model);

    let (pain_key, diff_key) = match record.shape {
        AnalysisShape::Comprehensive => ("pain_points", "differentiators"),
        AnalysisShape::Simple => ("patterns", "opportunities"),
    };

    match parsed {
        Some(value) => {
            analysis.summary =
                str_field(&value, "summary").or_else(|| extract_summary_fallback(&content));
            analysis.table_stakes = array_field(&value, "table_stakes");

            let pain = array_field(&value, pain_key);
            analysis.pain_points = if pain.is_empty() {
                record.patterns.clone()
            } else {
                pain
            };

            let diff = array_field(&value, diff_key);
            analysis.differentiators = if diff.is_empty() {
                record.opportunities.clone()
            } else {
                diff
            };

            analysis.competitive_summary = map_field(&value, "competitive_summary");
            analysis.total_low_reviews_analyzed = count_field(&value, "total_low_reviews_analyzed")
                .unwrap_or(record.total_low_reviews_analyzed);
            analysis.total_high_reviews_analyzed =
                count_field(&value, "total_high_reviews_analyzed")
                    .unwrap_or(record.total_high_reviews_analyzed);
        }
        None => {
            analysis.summary = extract_summary_fallback(&content);
            analysis.pain_points = record.patterns.clone();
            analysis.differentiators = record.opportunities.clone();
            analysis.total_low_reviews_analyzed = record.total_low_reviews_analyzed;
            analysis.total_high_reviews_analyzed = record.total_high_reviews_analyzed;
        }
    }

    analysis.total_reviews_analyzed = match record.shape {
        AnalysisShape::Simple => record.total_reviews_analyzed,
        AnalysisShape::Comprehensive => {
            analysis.total_low_reviews_analyzed + analysis.total_high_reviews_analyzed
        }
    };

    analysis.personas = record.personas.clone();
    analysis.raw_persona_extractions = record.raw_persona_extractions.clone();
    analysis.insider_language = record.insider_language.clone();
    analysis
}
