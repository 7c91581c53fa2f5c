//! Request orchestrator.
//!
//! Composes the pipeline stages in order: authenticate, rate-limit, embed
//! the query, retrieve grounding passages, assemble the prompt, call the
//! completion provider, shape the response. Embedding and retrieval
//! failures degrade to an ungrounded answer; authentication, rate-limit and
//! completion failures terminate the request. Embed-only mode skips the
//! chat stages and surfaces embedding failures directly.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthVerifier;
use crate::core::config::CompletionSettings;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, CompletionProvider, CompletionRequest, EmbeddingProvider};
use crate::prompt::PromptAssembler;
use crate::ratelimit::{RateDecision, RateLimiter};
use crate::retrieval::{RetrievalEngine, RetrievalMatch};

pub const CHAT_ENDPOINT: &str = "chat";
pub const EMBED_ENDPOINT: &str = "embed";

/// Provenance entry, derived 1:1 from the matches placed into the prompt.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub id: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub response: String,
    pub citations: Vec<Citation>,
}

pub struct ChatPipeline {
    auth: Arc<dyn AuthVerifier>,
    limiter: RateLimiter,
    embedder: Arc<dyn EmbeddingProvider>,
    retrieval: RetrievalEngine,
    assembler: PromptAssembler,
    completion: Arc<dyn CompletionProvider>,
    max_tokens: u32,
    temperature: f64,
}

impl ChatPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        auth: Arc<dyn AuthVerifier>,
        limiter: RateLimiter,
        embedder: Arc<dyn EmbeddingProvider>,
        retrieval: RetrievalEngine,
        assembler: PromptAssembler,
        completion: Arc<dyn CompletionProvider>,
        completion_settings: &CompletionSettings,
    ) -> Self {
        Self {
            auth,
            limiter,
            embedder,
            retrieval,
            assembler,
            completion,
            max_tokens: completion_settings.max_tokens,
            temperature: completion_settings.temperature,
        }
    }

    /// Run one chat request through the full pipeline.
    pub async fn handle_chat(
        &self,
        credential: &str,
        history: &[ChatMessage],
        question: &str,
    ) -> Result<ChatOutcome, ApiError> {
        let request_id = Uuid::new_v4();

        let identity = self.auth.verify(credential).await.map_err(|err| {
            tracing::warn!(%request_id, endpoint = CHAT_ENDPOINT, "authentication failed: {}", err);
            err
        })?;
        let user_id = identity.user_id.as_str();

        match self.limiter.admit(user_id, CHAT_ENDPOINT).await? {
            RateDecision::Allowed => {}
            RateDecision::Denied { retry_after } => {
                tracing::debug!(%request_id, user_id, endpoint = CHAT_ENDPOINT, retry_after, "rate limited");
                return Err(ApiError::RateLimited(retry_after));
            }
        }

        let matches = self.gather_context(user_id, question).await;
        let messages = self.assembler.assemble(history, &matches, question);

        let request = CompletionRequest {
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self.completion.complete(request).await.map_err(|err| {
            tracing::error!(%request_id, user_id, endpoint = CHAT_ENDPOINT, "completion failed: {}", err);
            err
        })?;

        let citations = matches
            .into_iter()
            .map(|m| Citation {
                id: m.document_id,
                similarity: m.similarity,
            })
            .collect();

        Ok(ChatOutcome {
            response,
            citations,
        })
    }

    /// Embed-only mode: authenticate, rate-limit, embed. Unlike the chat
    /// path, an embedding failure here is the request outcome.
    pub async fn handle_embed(&self, credential: &str, text: &str) -> Result<Vec<f32>, ApiError> {
        let request_id = Uuid::new_v4();

        let identity = self.auth.verify(credential).await.map_err(|err| {
            tracing::warn!(%request_id, endpoint = EMBED_ENDPOINT, "authentication failed: {}", err);
            err
        })?;
        let user_id = identity.user_id.as_str();

        match self.limiter.admit(user_id, EMBED_ENDPOINT).await? {
            RateDecision::Allowed => {}
            RateDecision::Denied { retry_after } => {
                tracing::debug!(%request_id, user_id, endpoint = EMBED_ENDPOINT, retry_after, "rate limited");
                return Err(ApiError::RateLimited(retry_after));
            }
        }

        self.embedder.embed(text).await.map_err(|err| {
            tracing::warn!(%request_id, user_id, endpoint = EMBED_ENDPOINT, "embedding failed: {}", err);
            err
        })
    }

    /// Best-effort grounding: any embedding or retrieval failure degrades to
    /// an empty match list so the request can still be answered.
    async fn gather_context(&self, user_id: &str, question: &str) -> Vec<RetrievalMatch> {
        let query_embedding = match self.embedder.embed(question).await {
            Ok(vector) => vector,
            Err(err) => {
                tracing::warn!(
                    user_id,
                    endpoint = CHAT_ENDPOINT,
                    "embedding failed, answering without grounding: {}",
                    err
                );
                return Vec::new();
            }
        };

        match self.retrieval.retrieve(&query_embedding).await {
            Ok(matches) => matches,
            Err(err) => {
                tracing::warn!(
                    user_id,
                    endpoint = CHAT_ENDPOINT,
                    "retrieval failed, answering without grounding: {}",
                    err
                );
                Vec::new()
            }
        }
    }
}
