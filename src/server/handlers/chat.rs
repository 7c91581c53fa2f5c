//! The single external-facing endpoint.
//!
//! Request bodies are an explicitly-typed tagged shape: an `action: "embed"`
//! body selects embed-only mode, anything else must be a chat request with a
//! message list. Malformed JSON or shapes are rejected with 400 before the
//! pipeline runs.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::extract_credential;
use crate::core::errors::ApiError;
use crate::llm::types::{ChatMessage, ROLE_ASSISTANT, ROLE_USER};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiRequest {
    Embed(EmbedRequest),
    Chat(ChatRequest),
}

#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
    #[allow(dead_code)]
    action: EmbedAction,
    text: String,
}

/// The only accepted `action` value; other strings fail deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedAction {
    Embed,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    messages: Vec<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    role: String,
    content: String,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ApiRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload
        .map_err(|rejection| ApiError::InvalidInput(format!("malformed request: {}", rejection)))?;

    let credential = extract_credential(&headers)?;

    match request {
        ApiRequest::Embed(embed) => {
            let text = embed.text.trim();
            if text.is_empty() {
                return Err(ApiError::InvalidInput("text must not be empty".to_string()));
            }

            let embedding = state.pipeline.handle_embed(&credential, text).await?;
            Ok(Json(json!({ "embedding": embedding })))
        }
        ApiRequest::Chat(chat) => {
            let (history, question) = validate_chat(chat)?;
            let outcome = state
                .pipeline
                .handle_chat(&credential, &history, &question)
                .await?;

            let mut body = json!({ "response": outcome.response });
            if !outcome.citations.is_empty() {
                body["citations"] = json!(outcome.citations);
            }
            Ok(Json(body))
        }
    }
}

/// Split a validated message list into history plus the new user question.
fn validate_chat(request: ChatRequest) -> Result<(Vec<ChatMessage>, String), ApiError> {
    if request.messages.is_empty() {
        return Err(ApiError::InvalidInput(
            "messages must not be empty".to_string(),
        ));
    }

    for message in &request.messages {
        if message.role != ROLE_USER && message.role != ROLE_ASSISTANT {
            return Err(ApiError::InvalidInput(format!(
                "unknown role '{}'",
                message.role
            )));
        }
        if message.content.trim().is_empty() {
            return Err(ApiError::InvalidInput(
                "message content must not be empty".to_string(),
            ));
        }
    }

    let mut messages: Vec<ChatMessage> = request
        .messages
        .into_iter()
        .map(|m| ChatMessage {
            role: m.role,
            content: m.content,
        })
        .collect();

    let Some(last) = messages.pop() else {
        return Err(ApiError::InvalidInput(
            "messages must not be empty".to_string(),
        ));
    };
    if last.role != ROLE_USER {
        return Err(ApiError::InvalidInput(
            "last message must be a user turn".to_string(),
        ));
    }

    Ok((messages, last.content))
}
