use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Request-level failure taxonomy.
///
/// The `Display` text (and any payload strings) are operational detail for
/// logs; the client-facing body is produced by `IntoResponse` and never
/// includes upstream response bodies or credentials.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("rate limited, retry after {0}s")]
    RateLimited(u64),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("embedding failure: {0}")]
    Embedding(String),
    #[error("retrieval failure: {0}")]
    Retrieval(String),
    #[error("completion failure: {0}")]
    UpstreamCompletion(String),
    #[error("missing configuration: {0}")]
    ConfigurationMissing(String),
    #[error("internal error: {0}")]
    Unknown(String),
}

impl ApiError {
    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Embedding(err.to_string())
    }

    pub fn retrieval<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Retrieval(err.to_string())
    }

    pub fn completion<E: std::fmt::Display>(err: E) -> Self {
        ApiError::UpstreamCompletion(err.to_string())
    }

    pub fn unknown<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Unknown(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "authentication required".to_string())
            }
            ApiError::RateLimited(_) => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate limit exceeded, try again later".to_string(),
            ),
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Embedding(_) => (
                StatusCode::BAD_GATEWAY,
                "embedding service unavailable, try again later".to_string(),
            ),
            ApiError::Retrieval(_) => (
                StatusCode::BAD_GATEWAY,
                "search is temporarily unavailable, try again later".to_string(),
            ),
            ApiError::UpstreamCompletion(_) => (
                StatusCode::BAD_GATEWAY,
                "the language model is unavailable, try again later".to_string(),
            ),
            ApiError::ConfigurationMissing(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "server configuration error".to_string(),
            ),
            ApiError::Unknown(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        let body = match &self {
            ApiError::RateLimited(retry_after) => {
                Json(json!({ "error": message, "retry_after": retry_after }))
            }
            _ => Json(json!({ "error": message })),
        };

        (status, body).into_response()
    }
}
