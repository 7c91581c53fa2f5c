use std::sync::Arc;

use crate::auth::HttpAuthVerifier;
use crate::core::config::Settings;
use crate::core::errors::ApiError;
use crate::llm::openai::{OpenAiCompletionClient, OpenAiEmbeddingClient};
use crate::pipeline::ChatPipeline;
use crate::prompt::PromptAssembler;
use crate::ratelimit::{RateLimiter, SqliteRateLimitStore};
use crate::retrieval::{RetrievalEngine, SqliteDocumentIndex};

/// Global application state shared across routes.
pub struct AppState {
    pub settings: Settings,
    pub pipeline: Arc<ChatPipeline>,
}

impl AppState {
    /// Wire the pipeline from settings: SQLite stores for rate limiting and
    /// documents, HTTP clients for auth, embeddings and completions.
    /// Missing provider credentials abort startup here rather than failing
    /// requests later.
    pub async fn initialize(settings: Settings) -> Result<Arc<Self>, ApiError> {
        let data_dir = &settings.server.data_dir;
        std::fs::create_dir_all(data_dir).map_err(ApiError::unknown)?;

        let rate_store = Arc::new(
            SqliteRateLimitStore::with_path(data_dir.join("rate_limit.db")).await?,
        );
        let limiter = RateLimiter::new(rate_store, &settings.rate_limit);

        let document_index = Arc::new(
            SqliteDocumentIndex::with_path(
                data_dir.join("documents.db"),
                &settings.embedding.model,
            )
            .await?,
        );
        let retrieval = RetrievalEngine::new(document_index, settings.retrieval.clone());

        let auth = Arc::new(HttpAuthVerifier::new(&settings.auth)?);
        let embedder = Arc::new(OpenAiEmbeddingClient::new(
            &settings.embedding,
            settings.retrieval.embedding_dim,
        )?);
        let completion = Arc::new(OpenAiCompletionClient::new(&settings.completion)?);
        let assembler = PromptAssembler::new(settings.prompt.clone());

        let pipeline = Arc::new(ChatPipeline::new(
            auth,
            limiter,
            embedder,
            retrieval,
            assembler,
            completion,
            &settings.completion,
        ));

        Ok(Arc::new(AppState { settings, pipeline }))
    }
}
