//! Gemini `generateContent` backend.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::{ModelBackend, ModelError};

/// Google Gemini backend. Requests JSON output at temperature 0 so the
/// same document yields the same response wherever the service allows.
pub struct GeminiModel {
    pub model: String,
    pub api_key: Option<String>,
    /// Overridable for tests and self-hosted proxies.
    pub base_url: String,
}

impl GeminiModel {
    pub fn new(model: impl Into<String>, api_key: Option<String>) -> Self {
        if api_key.is_none() {
            tracing::error!("model API key is not set, extraction calls will fail");
        }
        Self {
            model: model.into(),
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl ModelBackend for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>> {
        Box::pin(async move {
            let api_key = self
                .api_key
                .as_deref()
                .ok_or_else(|| ModelError::Request("model API key is not set".into()))?;

            let url = format!(
                "{}/models/{}:generateContent?key={}",
                self.base_url, self.model, api_key
            );

            let body = serde_json::json!({
                "contents": [{ "parts": [{ "text": prompt }] }],
                "generationConfig": {
                    "temperature": 0.0,
                    "topP": 1.0,
                    "topK": 40,
                    "maxOutputTokens": 1024,
                    "responseMimeType": "application/json",
                },
            });

            tracing::info!(model = %self.model, prompt_len = prompt.len(), "calling extraction model");

            let resp = client
                .post(&url)
                .json(&body)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ModelError::Timeout
                    } else {
                        ModelError::Request(e.to_string())
                    }
                })?;

            let status = resp.status();
            if !status.is_success() {
                return Err(ModelError::Request(format!("HTTP {}", status)));
            }

            let data: serde_json::Value = resp.json().await.map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout
                } else {
                    ModelError::Request(e.to_string())
                }
            })?;

            let text = data["candidates"]
                .as_array()
                .and_then(|c| c.first())
                .and_then(|c| c["content"]["parts"].as_array())
                .and_then(|p| p.first())
                .and_then(|p| p["text"].as_str())
                .unwrap_or("");

            if text.is_empty() {
                return Err(ModelError::Empty(
                    data["promptFeedback"]["blockReason"]
                        .as_str()
                        .unwrap_or("no candidate text")
                        .to_string(),
                ));
            }

            tracing::info!(chars = text.len(), "model response received");
            Ok(text.to_string())
        })
    }
}
