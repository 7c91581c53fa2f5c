//! OpenAI-compatible HTTP clients for embeddings and chat completions.
//!
//! Both clients speak the `/v1` JSON surface exposed by OpenAI and by
//! self-hosted gateways. Upstream error bodies are logged for diagnosis and
//! folded into internal error detail; they never reach response shaping.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::{CompletionProvider, EmbeddingProvider};
use super::types::CompletionRequest;
use crate::core::config::{CompletionSettings, EmbeddingSettings};
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct OpenAiEmbeddingClient {
    base_url: String,
    model: String,
    api_key: String,
    max_input_chars: usize,
    expected_dim: usize,
    client: Client,
}

impl OpenAiEmbeddingClient {
    pub fn new(settings: &EmbeddingSettings, expected_dim: usize) -> Result<Self, ApiError> {
        let api_key = settings.require_api_key()?.to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(ApiError::unknown)?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
            max_input_chars: settings.max_input_chars,
            expected_dim,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let input = truncate_chars(text, self.max_input_chars);

        let body = json!({
            "model": self.model,
            "input": input,
        });

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::embedding)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            tracing::warn!(%status, "embedding provider returned non-success: {}", text);
            return Err(ApiError::Embedding(format!("upstream status {}", status)));
        }

        let payload: Value = res.json().await.map_err(ApiError::embedding)?;
        parse_embedding_payload(&payload, self.expected_dim)
    }
}

#[derive(Clone)]
pub struct OpenAiCompletionClient {
    base_url: String,
    model: String,
    api_key: String,
    client: Client,
}

impl OpenAiCompletionClient {
    pub fn new(settings: &CompletionSettings) -> Result<Self, ApiError> {
        let api_key = settings.require_api_key()?.to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(ApiError::unknown)?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ApiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let body = json!({
            "model": self.model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": false,
        });

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::completion)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            tracing::warn!(%status, "completion provider returned non-success: {}", text);
            return Err(ApiError::UpstreamCompletion(format!(
                "upstream status {}",
                status
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::completion)?;
        parse_completion_payload(&payload)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn parse_embedding_payload(payload: &Value, expected_dim: usize) -> Result<Vec<f32>, ApiError> {
    let values = payload["data"][0]["embedding"]
        .as_array()
        .ok_or_else(|| ApiError::Embedding("no embedding in response".to_string()))?;

    let vector: Vec<f32> = values
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| ApiError::Embedding("non-numeric embedding values".to_string()))?;

    if vector.len() != expected_dim {
        return Err(ApiError::Embedding(format!(
            "unexpected embedding dimension {} (want {})",
            vector.len(),
            expected_dim
        )));
    }

    Ok(vector)
}

fn parse_completion_payload(payload: &Value) -> Result<String, ApiError> {
    let content = payload["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default();

    if content.trim().is_empty() {
        return Err(ApiError::UpstreamCompletion(
            "empty answer in completion response".to_string(),
        ));
    }

    Ok(content.to_string())
}
