//! Authentication gate.
//!
//! Credential extraction from request headers plus the seam to the external
//! auth service. No session or credential management lives here; the service
//! either resolves a credential to a user identity or signals invalidity.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::core::config::AuthSettings;
use crate::core::errors::ApiError;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: String,
}

/// Pull the caller credential from `authorization: Bearer ..` or `x-api-key`.
pub fn extract_credential(headers: &HeaderMap) -> Result<String, ApiError> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                if !token.trim().is_empty() {
                    return Ok(token.trim().to_string());
                }
            }
        }
    }

    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if api_key.trim().is_empty() {
        return Err(ApiError::Unauthenticated);
    }

    Ok(api_key.trim().to_string())
}

#[async_trait]
pub trait AuthVerifier: Send + Sync {
    /// Resolve a credential to an identity. Invalid or unknown credentials
    /// are `Unauthenticated`; auth-service outages are `Unknown`.
    async fn verify(&self, credential: &str) -> Result<UserIdentity, ApiError>;
}

pub struct HttpAuthVerifier {
    base_url: String,
    client: Client,
}

#[derive(Deserialize)]
struct VerifyResponse {
    user_id: String,
}

impl HttpAuthVerifier {
    pub fn new(settings: &AuthSettings) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(ApiError::unknown)?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl AuthVerifier for HttpAuthVerifier {
    async fn verify(&self, credential: &str) -> Result<UserIdentity, ApiError> {
        let url = format!("{}/verify", self.base_url);

        let res = self
            .client
            .get(&url)
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|e| ApiError::Unknown(format!("auth service unreachable: {}", e)))?;

        match res.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Unauthenticated),
            status if status.is_success() => {
                let body: VerifyResponse = res
                    .json()
                    .await
                    .map_err(|_| ApiError::Unauthenticated)?;
                if body.user_id.trim().is_empty() {
                    return Err(ApiError::Unauthenticated);
                }
                Ok(UserIdentity {
                    user_id: body.user_id,
                })
            }
            status => Err(ApiError::Unknown(format!(
                "auth service returned status {}",
                status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer secret-token"),
        );

        let credential = extract_credential(&headers).expect("credential");
        assert_eq!(credential, "secret-token");
    }

    #[test]
    fn api_key_header_is_a_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("legacy-key"));

        let credential = extract_credential(&headers).expect("credential");
        assert_eq!(credential, "legacy-key");
    }

    #[test]
    fn missing_or_empty_credentials_are_unauthenticated() {
        let headers = HeaderMap::new();
        assert!(matches!(
            extract_credential(&headers),
            Err(ApiError::Unauthenticated)
        ));

        let mut empty_bearer = HeaderMap::new();
        empty_bearer.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer "),
        );
        assert!(matches!(
            extract_credential(&empty_bearer),
            Err(ApiError::Unauthenticated)
        ));
    }

    #[test]
    fn non_utf8_header_is_unauthenticated() {
        let mut headers = HeaderMap::new();
        let non_utf8 = HeaderValue::from_bytes(&[0xFF, 0xFE, 0xFD]).expect("header bytes");
        headers.insert(API_KEY_HEADER, non_utf8);

        assert!(matches!(
            extract_credential(&headers),
            Err(ApiError::Unauthenticated)
        ));
    }
}
