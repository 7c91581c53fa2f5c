//! Per-(user, endpoint) fixed-window rate limiting.
//!
//! Window state lives in a shared store behind [`RateLimitStore`]. One call
//! to [`RateLimitStore::hit`] performs the whole conditional upsert
//! atomically (create, reset-on-expiry, or increment) and returns the
//! post-update window; the limiter derives Allowed/Denied from that state.
//! Denied requests still increment the counter, so admission is
//! `request_count <= limit` against the post-state.

pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::config::RateLimitSettings;
use crate::core::errors::ApiError;

pub use sqlite::SqliteRateLimitStore;

/// Post-update window state for one (user, endpoint) key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub request_count: i64,
    /// Unix seconds at which the current window opened.
    pub window_start: i64,
}

/// Outcome of an admission check. Denial is an expected outcome, not an
/// error; the orchestrator surfaces it without retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after: u64 },
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically register one request at `now` (unix seconds) and return
    /// the resulting window: a fresh window with count 1 when none exists or
    /// the existing one expired, otherwise the incremented current window.
    async fn hit(
        &self,
        user_id: &str,
        endpoint: &str,
        now: i64,
        window_secs: u64,
    ) -> Result<RateWindow, ApiError>;
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    limit: u32,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, settings: &RateLimitSettings) -> Self {
        Self {
            store,
            limit: settings.limit,
            window_secs: settings.window_secs,
        }
    }

    pub async fn admit(&self, user_id: &str, endpoint: &str) -> Result<RateDecision, ApiError> {
        self.admit_at(user_id, endpoint, chrono::Utc::now().timestamp())
            .await
    }

    /// Admission with an explicit clock, so tests never sleep.
    pub async fn admit_at(
        &self,
        user_id: &str,
        endpoint: &str,
        now: i64,
    ) -> Result<RateDecision, ApiError> {
        let window = self
            .store
            .hit(user_id, endpoint, now, self.window_secs)
            .await?;

        if window.request_count <= i64::from(self.limit) {
            return Ok(RateDecision::Allowed);
        }

        let retry_after = window.window_start + self.window_secs as i64 - now;
        Ok(RateDecision::Denied {
            retry_after: retry_after.max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RateLimitSettings;

    async fn limiter(limit: u32, window_secs: u64) -> RateLimiter {
        let store = Arc::new(SqliteRateLimitStore::in_memory().await.unwrap());
        RateLimiter::new(
            store,
            &RateLimitSettings {
                limit,
                window_secs,
            },
        )
    }

    #[tokio::test]
    async fn first_request_opens_a_window_and_is_allowed() {
        let limiter = limiter(10, 60).await;
        let decision = limiter.admit_at("u1", "chat", 1000).await.unwrap();
        assert_eq!(decision, RateDecision::Allowed);
    }

    #[tokio::test]
    async fn eleventh_request_in_window_is_denied_with_positive_retry_after() {
        let limiter = limiter(10, 60).await;

        for i in 0..10 {
            let decision = limiter.admit_at("u1", "chat", 1000 + i).await.unwrap();
            assert_eq!(decision, RateDecision::Allowed, "request {} should pass", i);
        }

        match limiter.admit_at("u1", "chat", 1030).await.unwrap() {
            RateDecision::Denied { retry_after } => {
                // window opened at 1000, so 1000 + 60 - 1030
                assert_eq!(retry_after, 30);
            }
            RateDecision::Allowed => panic!("request over the limit must be denied"),
        }
    }

    #[tokio::test]
    async fn expired_window_resets_regardless_of_prior_count() {
        let limiter = limiter(2, 60).await;

        for now in [1000, 1001, 1002, 1003] {
            let _ = limiter.admit_at("u1", "chat", now).await.unwrap();
        }
        // well past 1000 + 60
        let decision = limiter.admit_at("u1", "chat", 1061).await.unwrap();
        assert_eq!(decision, RateDecision::Allowed);

        // and the reset window enforces the limit again
        let _ = limiter.admit_at("u1", "chat", 1062).await.unwrap();
        let third = limiter.admit_at("u1", "chat", 1063).await.unwrap();
        assert!(matches!(third, RateDecision::Denied { .. }));
    }

    #[tokio::test]
    async fn keys_do_not_share_windows() {
        let limiter = limiter(1, 60).await;

        assert_eq!(
            limiter.admit_at("u1", "chat", 1000).await.unwrap(),
            RateDecision::Allowed
        );
        assert_eq!(
            limiter.admit_at("u2", "chat", 1000).await.unwrap(),
            RateDecision::Allowed
        );
        assert_eq!(
            limiter.admit_at("u1", "embed", 1000).await.unwrap(),
            RateDecision::Allowed
        );
        assert!(matches!(
            limiter.admit_at("u1", "chat", 1001).await.unwrap(),
            RateDecision::Denied { .. }
        ));
    }
}
