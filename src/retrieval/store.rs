//! DocumentIndex trait: the nearest-neighbor seam over the document store.
//!
//! The core treats vector search as a black box: it hands the store a query
//! vector and a result-count limit and gets back scored documents. Threshold
//! and k policy live in the retrieval engine, not here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// A stored document. Owned by the external ingestion subsystem; the core
/// only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Opaque stable identifier.
    pub id: String,
    pub title: String,
    pub content: String,
    /// Present once the ingestion side has embedded the content. Always the
    /// same model and dimension as query vectors compared against it.
    pub embedding: Option<Vec<f32>>,
}

/// One nearest-neighbor result with its cosine similarity.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub similarity: f32,
}

#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Return up to `limit` documents ordered by descending cosine
    /// similarity to `query_embedding`. An empty corpus yields an empty list.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredDocument>, ApiError>;
}
