use async_trait::async_trait;

use super::types::CompletionRequest;
use crate::core::errors::ApiError;

/// Turns text into a fixed-length vector via an external provider.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError>;
}

/// Single-shot, non-streaming chat completion against an external provider.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ApiError>;
}
