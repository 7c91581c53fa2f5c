//! Retrieval engine: threshold/k policy over the document index.

pub mod sqlite;
pub mod store;

use std::sync::Arc;

use serde::Serialize;

use crate::core::config::RetrievalSettings;
use crate::core::errors::ApiError;

pub use sqlite::SqliteDocumentIndex;
pub use store::{Document, DocumentIndex, ScoredDocument};

/// A passage selected for grounding. Ephemeral, constructed per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalMatch {
    pub document_id: String,
    pub title: String,
    pub snippet: String,
    pub similarity: f32,
}

pub struct RetrievalEngine {
    index: Arc<dyn DocumentIndex>,
    settings: RetrievalSettings,
}

impl RetrievalEngine {
    pub fn new(index: Arc<dyn DocumentIndex>, settings: RetrievalSettings) -> Self {
        Self { index, settings }
    }

    /// Top-k matches strictly above the similarity threshold, descending.
    /// An empty list is a valid outcome meaning "answer without grounding";
    /// store failures propagate for the caller to absorb.
    pub async fn retrieve(&self, query_embedding: &[f32]) -> Result<Vec<RetrievalMatch>, ApiError> {
        if query_embedding.len() != self.settings.embedding_dim {
            return Err(ApiError::Retrieval(format!(
                "query vector has dimension {}, index expects {}",
                query_embedding.len(),
                self.settings.embedding_dim
            )));
        }

        let scored = self
            .index
            .search(query_embedding, self.settings.top_k)
            .await?;

        let matches = scored
            .into_iter()
            .filter(|s| s.similarity > self.settings.similarity_threshold)
            .take(self.settings.top_k)
            .map(|s| RetrievalMatch {
                document_id: s.document.id,
                title: s.document.title,
                snippet: truncate_chars(&s.document.content, self.settings.snippet_chars),
                similarity: s.similarity,
            })
            .collect();

        Ok(matches)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
