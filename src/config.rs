//! Application configuration
//!
//! All policy constants, model identifiers, and network pacing knobs live
//! here. The loaded configuration is passed explicitly into each collaborator
//! at construction; nothing reads process-wide state after startup.

use crate::freshness::FreshnessPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable holding the OpenRouter API credential
pub const API_KEY_VAR: &str = "OPENROUTER_API_KEY";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default App Store country code
    #[serde(default = "default_country")]
    pub country: String,

    /// Default number of top apps to analyze per keyword
    #[serde(default = "default_app_limit")]
    pub app_limit: usize,

    /// Cache freshness policy (TTLs and drift thresholds)
    #[serde(default)]
    pub freshness: FreshnessPolicy,

    /// LLM gateway settings
    #[serde(default)]
    pub llm: LlmSettings,

    /// Network pacing settings
    #[serde(default)]
    pub pacing: PacingSettings,
}

/// LLM gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Chat-completions endpoint base URL
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Model used for review analysis and persona normalization
    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,

    /// Model used for screenshot (vision) analysis
    #[serde(default = "default_analysis_model")]
    pub vision_model: String,

    /// Model used for ASO and keyword intelligence
    #[serde(default = "default_aso_model")]
    pub aso_model: String,

    /// Sampling temperature for analysis prompts
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Bounded retry count for gateway calls
    #[serde(default = "default_llm_retries")]
    pub max_retries: usize,
}

/// Network pacing settings
///
/// The catalog endpoints throttle aggressively; these delays keep a full
/// aggregation run under their implicit limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingSettings {
    /// Flat delay between apps during review aggregation (milliseconds)
    #[serde(default = "default_inter_app_delay_ms")]
    pub inter_app_delay_ms: u64,

    /// Delay between review feed pages (milliseconds)
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Minimum spacing between product-page scrapes (milliseconds)
    #[serde(default = "default_scrape_delay_ms")]
    pub scrape_delay_ms: u64,

    /// Bounded retry count for the metadata scraper
    #[serde(default = "default_scrape_retries")]
    pub scrape_retries: usize,

    /// Per-call HTTP timeout (seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_country() -> String {
    "us".to_string()
}

fn default_app_limit() -> usize {
    10
}

fn default_llm_endpoint() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_analysis_model() -> String {
    "google/gemini-2.5-pro".to_string()
}

fn default_aso_model() -> String {
    "google/gemini-3-flash-preview".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_llm_retries() -> usize {
    3
}

fn default_inter_app_delay_ms() -> u64 {
    2000
}

fn default_page_delay_ms() -> u64 {
    1000
}

fn default_scrape_delay_ms() -> u64 {
    2000
}

fn default_scrape_retries() -> usize {
    3
}

fn default_http_timeout_secs() -> u64 {
    8
}

impl Default for Config {
    fn default() -> Self {
        Self {
            country: default_country(),
            app_limit: default_app_limit(),
            freshness: FreshnessPolicy::default(),
            llm: LlmSettings::default(),
            pacing: PacingSettings::default(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            analysis_model: default_analysis_model(),
            vision_model: default_analysis_model(),
            aso_model: default_aso_model(),
            temperature: default_temperature(),
            max_retries: default_llm_retries(),
        }
    }
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            inter_app_delay_ms: default_inter_app_delay_ms(),
            page_delay_ms: default_page_delay_ms(),
            scrape_delay_ms: default_scrape_delay_ms(),
            scrape_retries: default_scrape_retries(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, or return defaults when the file
    /// does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Read the LLM API credential from the environment
    ///
    /// Checked once per invocation before any gateway call is attempted;
    /// absence is a pre-flight fatal condition.
    pub fn require_api_key() -> Result<String> {
        match std::env::var(API_KEY_VAR) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => anyhow::bail!(
                "{} not set. Export your OpenRouter API key before running.",
                API_KEY_VAR
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.country, "us");
        assert_eq!(config.app_limit, 10);
        assert!(config.llm.endpoint.contains("openrouter"));
        assert_eq!(config.pacing.http_timeout_secs, 8);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load_or_default(Path::new("/nonexistent/storepulse.toml")).unwrap();
        assert_eq!(config.app_limit, 10);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "country = \"de\"\n[llm]\ntemperature = 0.2\n").unwrap();

        let config = Config::load_or_default(&path).unwrap();
        assert_eq!(config.country, "de");
        assert_eq!(config.llm.temperature, 0.2);
        assert_eq!(config.app_limit, 10);
        assert_eq!(config.freshness.app_list_ttl_days, 2);
    }
}
