//! App detail lookup and screenshot downloads

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

const LOOKUP_URL: &str = "https://itunes.apple.com/lookup";

/// Detailed app record from the lookup API
#[derive(Debug, Clone)]
pub struct AppDetails {
    pub app_id: String,
    pub app_name: Option<String>,
    pub bundle_id: Option<String>,
    pub version: Option<String>,
    pub artwork_url: Option<String>,
    pub screenshot_urls: Vec<String>,
    pub ipad_screenshot_urls: Vec<String>,
    pub description: Option<String>,
    pub release_notes: Option<String>,
}

/// Client for the lookup API and screenshot image downloads
pub struct ScreenshotsClient {
    client: reqwest::Client,
    lookup_url: String,
}

impl ScreenshotsClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            lookup_url: LOOKUP_URL.to_string(),
        })
    }

    /// Fetch app details including screenshot URLs
    ///
    /// Degrades to `None` on any failure; a missing detail record only costs
    /// that one app its screenshot analysis.
    pub async fn fetch_app_details(&self, app_id: &str) -> Option<AppDetails> {
        let response = match self
            .client
            .get(&self.lookup_url)
            .query(&[("id", app_id)])
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::warn!(app_id, status = %response.status(), "app lookup failed");
                return None;
            }
            Err(e) => {
                tracing::warn!(app_id, error = %e, "app lookup request failed");
                return None;
            }
        };

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(app_id, error = %e, "app lookup parse failed");
                return None;
            }
        };

        parse_details(&body, app_id)
    }

    /// Download one screenshot image, or `None` on failure
    pub async fn download(&self, url: &str) -> Option<Vec<u8>> {
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                response.bytes().await.ok().map(|b| b.to_vec())
            }
            Ok(response) => {
                tracing::warn!(url, status = %response.status(), "screenshot download failed");
                None
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "screenshot download request failed");
                None
            }
        }
    }
}

fn parse_details(body: &Value, app_id: &str) -> Option<AppDetails> {
    let info = body.get("results")?.as_array()?.first()?;

    Some(AppDetails {
        app_id: app_id.to_string(),
        app_name: str_field(info, "trackName"),
        bundle_id: str_field(info, "bundleId"),
        version: str_field(info, "version"),
        artwork_url: str_field(info, "artworkUrl512"),
        screenshot_urls: url_list(info, "screenshotUrls"),
        ipad_screenshot_urls: url_list(info, "ipadScreenshotUrls"),
        description: str_field(info, "description"),
        release_notes: str_field(info, "releaseNotes"),
    })
}

fn str_field(info: &Value, key: &str) -> Option<String> {
    info.get(key).and_then(Value::as_str).map(str::to_string)
}

fn url_list(info: &Value, key: &str) -> Vec<String> {
    info.get(key)
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_details() {
        let body = json!({
            "resultCount": 1,
            "results": [{
                "trackName": "Calm Minds",
                "bundleId": "com.calm.minds",
                "version": "3.2.1",
                "artworkUrl512": "https://example.com/icon.png",
                "screenshotUrls": ["https://example.com/s1.png", "https://example.com/s2.png"],
                "description": "Guided meditation"
            }]
        });

        let details = parse_details(&body, "100").unwrap();
        assert_eq!(details.app_name.as_deref(), Some("Calm Minds"));
        assert_eq!(details.screenshot_urls.len(), 2);
        assert!(details.ipad_screenshot_urls.is_empty());
        assert!(details.release_notes.is_none());
    }

    #[test]
    fn test_empty_results() {
        let body = json!({"resultCount": 0, "results": []});
        assert!(parse_details(&body, "100").is_none());
    }
}
