//! SQLite-backed rate-limit store.
//!
//! One row per (user_id, endpoint) key. The whole hit is a single
//! `INSERT .. ON CONFLICT DO UPDATE .. RETURNING` statement, so concurrent
//! requests for the same key cannot lose updates: SQLite evaluates the
//! upsert against the committed row under its write lock, and both CASE
//! arms read the pre-update column values.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};

use super::{RateLimitStore, RateWindow};
use crate::core::errors::ApiError;

pub struct SqliteRateLimitStore {
    pool: SqlitePool,
}

impl SqliteRateLimitStore {
    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::unknown)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Single-connection in-memory store for tests.
    pub async fn in_memory() -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(ApiError::unknown)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rate_windows (
                user_id TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                request_count INTEGER NOT NULL,
                window_start INTEGER NOT NULL,
                PRIMARY KEY (user_id, endpoint)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::unknown)?;

        Ok(())
    }
}

#[async_trait]
impl RateLimitStore for SqliteRateLimitStore {
    async fn hit(
        &self,
        user_id: &str,
        endpoint: &str,
        now: i64,
        window_secs: u64,
    ) -> Result<RateWindow, ApiError> {
        let row = sqlx::query(
            "INSERT INTO rate_windows (user_id, endpoint, request_count, window_start)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(user_id, endpoint) DO UPDATE SET
                 request_count = CASE
                     WHEN ?3 - window_start >= ?4 THEN 1
                     ELSE request_count + 1
                 END,
                 window_start = CASE
                     WHEN ?3 - window_start >= ?4 THEN ?3
                     ELSE window_start
                 END
             RETURNING request_count, window_start",
        )
        .bind(user_id)
        .bind(endpoint)
        .bind(now)
        .bind(window_secs as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(ApiError::unknown)?;

        Ok(RateWindow {
            request_count: row.get("request_count"),
            window_start: row.get("window_start"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hit_counts_up_within_a_window() {
        let store = SqliteRateLimitStore::in_memory().await.unwrap();

        for expected in 1..=3 {
            let window = store.hit("u1", "chat", 1000, 60).await.unwrap();
            assert_eq!(window.request_count, expected);
            assert_eq!(window.window_start, 1000);
        }
    }

    #[tokio::test]
    async fn hit_resets_an_expired_window_in_place() {
        let store = SqliteRateLimitStore::in_memory().await.unwrap();

        for _ in 0..5 {
            store.hit("u1", "chat", 1000, 60).await.unwrap();
        }

        let window = store.hit("u1", "chat", 1060, 60).await.unwrap();
        assert_eq!(window.request_count, 1);
        assert_eq!(window.window_start, 1060);
    }

    #[tokio::test]
    async fn boundary_instant_counts_as_a_new_window() {
        let store = SqliteRateLimitStore::in_memory().await.unwrap();

        store.hit("u1", "chat", 1000, 60).await.unwrap();
        // exactly window_start + window_secs is stale, not current
        let window = store.hit("u1", "chat", 1060, 60).await.unwrap();
        assert_eq!(window.request_count, 1);
    }

    #[tokio::test]
    async fn concurrent_hits_on_one_key_never_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(
            SqliteRateLimitStore::with_path(dir.path().join("rate.db"))
                .await
                .unwrap(),
        );

        let mut handles = Vec::new();
        for _ in 0..25 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.hit("u1", "chat", 1000, 60).await.unwrap()
            }));
        }

        let mut max_count = 0;
        for handle in handles {
            let window = handle.await.unwrap();
            max_count = max_count.max(window.request_count);
        }

        // every hit landed on the same counter
        assert_eq!(max_count, 25);
    }
}
