//! SQLite-backed document index.
//!
//! Documents and their embeddings live in one table; embeddings are stored
//! as little-endian f32 BLOBs and searched by brute-force cosine similarity.
//! The index records which embedding model produced its vectors and refuses
//! to open under a different model, since cross-model comparisons are
//! meaningless.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};

use super::store::{Document, DocumentIndex, ScoredDocument};
use crate::core::errors::ApiError;

#[derive(Debug)]
pub struct SqliteDocumentIndex {
    pool: SqlitePool,
}

impl SqliteDocumentIndex {
    pub async fn with_path(db_path: PathBuf, embedding_model: &str) -> Result<Self, ApiError> {
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

        let index = Self { pool };
        index.init_schema().await?;
        index.ensure_model(embedding_model).await?;
        Ok(index)
    }

    /// Single-connection in-memory index for tests.
    pub async fn in_memory(embedding_model: &str) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(ApiError::unknown)?;

        let index = Self { pool };
        index.init_schema().await?;
        index.ensure_model(embedding_model).await?;
        Ok(index)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::unknown)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::unknown)?;

        Ok(())
    }

    async fn ensure_model(&self, embedding_model: &str) -> Result<(), ApiError> {
        let row = sqlx::query("SELECT value FROM index_meta WHERE key = 'embedding_model'")
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::unknown)?;

        match row {
            None => {
                sqlx::query("INSERT INTO index_meta (key, value) VALUES ('embedding_model', ?1)")
                    .bind(embedding_model)
                    .execute(&self.pool)
                    .await
                    .map_err(ApiError::unknown)?;
                Ok(())
            }
            Some(row) => {
                let stored: String = row.get("value");
                if stored != embedding_model {
                    return Err(ApiError::Unknown(format!(
                        "document index was built with embedding model '{}', configured model is '{}'; reindex required",
                        stored, embedding_model
                    )));
                }
                Ok(())
            }
        }
    }

    /// Write path for the ingestion collaborator (and tests). Not part of
    /// the request pipeline, which only searches.
    pub async fn insert(&self, document: &Document) -> Result<(), ApiError> {
        let blob = document.embedding.as_deref().map(serialize_embedding);

        sqlx::query(
            "INSERT OR REPLACE INTO documents (id, title, content, embedding)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&document.id)
        .bind(&document.title)
        .bind(&document.content)
        .bind(blob)
        .execute(&self.pool)
        .await
        .map_err(ApiError::unknown)?;

        Ok(())
    }

    pub async fn count(&self) -> Result<i64, ApiError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::unknown)?;
        Ok(row.get("n"))
    }
}

#[async_trait]
impl DocumentIndex for SqliteDocumentIndex {
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredDocument>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, title, content, embedding FROM documents WHERE embedding IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::retrieval)?;

        let mut scored: Vec<ScoredDocument> = rows
            .iter()
            .filter_map(|row| {
                let bytes: Vec<u8> = row.get("embedding");
                if bytes.is_empty() {
                    return None;
                }
                let embedding = deserialize_embedding(&bytes);
                if embedding.len() != query_embedding.len() {
                    return None;
                }
                let similarity = cosine_similarity(query_embedding, &embedding);

                Some(ScoredDocument {
                    document: Document {
                        id: row.get("id"),
                        title: row.get("title"),
                        content: row.get("content"),
                        embedding: Some(embedding),
                    },
                    similarity,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, embedding: Vec<f32>) -> Document {
        Document {
            id: id.to_string(),
            title: format!("title {}", id),
            content: format!("content {}", id),
            embedding: Some(embedding),
        }
    }

    #[tokio::test]
    async fn search_orders_by_descending_similarity() {
        let index = SqliteDocumentIndex::in_memory("test-model").await.unwrap();
        index.insert(&doc("a", vec![0.8, 0.2, 0.0])).await.unwrap();
        index.insert(&doc("b", vec![1.0, 0.0, 0.0])).await.unwrap();
        index.insert(&doc("c", vec![0.0, 1.0, 0.0])).await.unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 10).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].document.id, "b");
        assert_eq!(results[1].document.id, "a");
        assert_eq!(results[2].document.id, "c");
        assert!((results[0].similarity - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn search_respects_limit_and_skips_unembedded_documents() {
        let index = SqliteDocumentIndex::in_memory("test-model").await.unwrap();
        index.insert(&doc("a", vec![1.0, 0.0])).await.unwrap();
        index.insert(&doc("b", vec![0.9, 0.1])).await.unwrap();
        index
            .insert(&Document {
                id: "pending".to_string(),
                title: "not yet embedded".to_string(),
                content: "".to_string(),
                embedding: None,
            })
            .await
            .unwrap();

        let results = index.search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, "a");
    }

    #[tokio::test]
    async fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn embedding_codec_round_trips() {
        let original = vec![0.25f32, -1.5, 3.75];
        let decoded = deserialize_embedding(&serialize_embedding(&original));
        assert_eq!(decoded, original);
    }

    #[tokio::test]
    async fn opening_with_a_different_model_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.db");

        let first = SqliteDocumentIndex::with_path(path.clone(), "model-a")
            .await
            .unwrap();
        drop(first);

        let err = SqliteDocumentIndex::with_path(path, "model-b")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unknown(_)));
    }
}
