use std::sync::Arc;

use anyhow::Context;
use ragline::chat::DEFAULT_SYSTEM_PROMPT;
use ragline::{
    CachedEmbeddingProvider, ChatModel, LruEmbeddingCache, OpenAIChatModel,
    OpenAIEmbeddingProvider, QdrantConfig, QdrantVectorStore, RagPipeline,
};

use crate::config::ServerConfig;

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
    pub chat: Arc<dyn ChatModel>,
    pub system_prompt: Arc<str>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").field("chat", &self.chat.name()).finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(pipeline: Arc<RagPipeline>, chat: Arc<dyn ChatModel>) -> Self {
        Self { pipeline, chat, system_prompt: Arc::from(DEFAULT_SYSTEM_PROMPT) }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Arc::from(prompt.into());
        self
    }

    /// Wire the OpenAI providers, the embedding cache and Qdrant from `config`.
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let mut embedder = OpenAIEmbeddingProvider::new(&config.openai_api_key)
            .context("invalid OpenAI configuration")?
            .with_model(&config.embedding_model)
            .with_timeout(config.remote_timeout);
        // The API's default output size is 1536; only request truncation when it differs.
        if config.vector_size != 1536 {
            embedder = embedder.with_dimensions(config.vector_size);
        }
        let cache = Arc::new(LruEmbeddingCache::new(config.embedding_cache_capacity));
        let embedder = CachedEmbeddingProvider::new(embedder, cache);

        let mut qdrant = QdrantConfig::new(&config.qdrant_url, &config.qdrant_collection)
            .with_vector_size(config.vector_size)
            .with_timeout(config.remote_timeout);
        if let Some(api_key) = &config.qdrant_api_key {
            qdrant = qdrant.with_api_key(api_key);
        }
        let store = QdrantVectorStore::new(qdrant).context("failed to create Qdrant client")?;

        let pipeline = RagPipeline::builder()
            .config(config.rag.clone())
            .embedding_provider(Arc::new(embedder))
            .vector_store(Arc::new(store))
            .build()
            .context("invalid pipeline configuration")?;

        let chat = OpenAIChatModel::new(&config.openai_api_key)
            .context("invalid OpenAI configuration")?
            .with_model(&config.chat_model)
            .with_timeout(config.remote_timeout);

        Ok(Self::new(Arc::new(pipeline), Arc::new(chat)))
    }
}
