//! Chat-completion client for the LLM gateway

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Gateway failures, surfaced as tagged results rather than panics
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("response contained no content")]
    EmptyResponse,
}

/// One completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: MessageContent,
    pub model: String,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn text(system: &str, user: &str, model: &str, temperature: f32) -> Self {
        Self {
            system: system.to_string(),
            user: MessageContent::Text(user.to_string()),
            model: model.to_string(),
            temperature,
        }
    }
}

/// Message content: plain text, or mixed text/image parts for vision prompts
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of the message, ignoring image parts
    pub fn text_of(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// One part of a multimodal message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// An inline image as a base64 data URI
    pub fn image_data_uri(mime_type: &str, base64_data: &str) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{};base64,{}", mime_type, base64_data),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Provider seam for completion submission
///
/// Production uses [`OpenRouterClient`]; tests substitute [`MockLlmClient`].
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Submit a completion and return the provider's raw text payload
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

/// OpenRouter-style chat-completions client
pub struct OpenRouterClient {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: usize,
}

impl OpenRouterClient {
    pub fn new(endpoint: &str, api_key: &str, max_retries: usize) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
            max_retries,
        }
    }

    async fn complete_once(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.endpoint);

        let body = ChatRequest {
            model: request.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: MessageContent::Text(request.system.clone()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user.clone(),
                },
            ],
            temperature: Some(request.temperature),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let result: ChatResponse = response.json().await?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl CompletionProvider for OpenRouterClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let mut last_error = None;

        for attempt in 0..self.max_retries.max(1) {
            match self.complete_once(&request).await {
                Ok(content) => return Ok(content),
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "LLM request failed");
                    last_error = Some(e);
                    tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1))).await;
                }
            }
        }

        Err(last_error.unwrap_or(LlmError::EmptyResponse))
    }
}

// Chat API types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Mock completion provider for testing
pub struct MockLlmClient {
    responses: Vec<(String, String)>,
    default_response: String,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            default_response: "{}".to_string(),
        }
    }

    /// Respond with `response` when the user prompt contains `prompt_contains`
    pub fn add_response(&mut self, prompt_contains: &str, response: &str) {
        self.responses
            .push((prompt_contains.to_string(), response.to_string()));
    }

    /// Set the fallback response for unmatched prompts
    pub fn set_default(&mut self, response: &str) {
        self.default_response = response.to_string();
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for MockLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let prompt = request.user.text_of();
        for (key, response) in &self.responses {
            if prompt.contains(key.as_str()) {
                return Ok(response.clone());
            }
        }
        Ok(self.default_response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client() {
        let mut client = MockLlmClient::new();
        client.add_response("meditation", r#"{"summary": "crowded market"}"#);

        let request =
            CompletionRequest::text("system", "analyze meditation apps", "test-model", 0.7);
        let response = client.complete(request).await.unwrap();
        assert!(response.contains("crowded market"));

        let request = CompletionRequest::text("system", "something else", "test-model", 0.7);
        assert_eq!(client.complete(request).await.unwrap(), "{}");
    }

    #[test]
    fn test_content_part_serialization() {
        let part = ContentPart::image_data_uri("image/png", "QUJD");
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "image_url");
        assert_eq!(json["image_url"]["url"], "data:image/png;base64,QUJD");

        let text = ContentPart::text("Screenshot 1:");
        let json = serde_json::to_value(&text).unwrap();
        assert_eq!(json["type"], "text");
    }

    #[test]
    fn test_message_content_text_of() {
        let parts = MessageContent::Parts(vec![
            ContentPart::text("describe these"),
            ContentPart::image_data_uri("image/png", "QUJD"),
            ContentPart::text("in order"),
        ]);
        assert_eq!(parts.text_of(), "describe these\nin order");
    }
}
