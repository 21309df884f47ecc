//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the full ingest-and-query workflow by
//! composing an [`EmbeddingProvider`], a [`VectorStore`], a [`Chunker`],
//! a [`ContextAssembler`] and an optional [`Reranker`].
//!
//! # Example
//!
//! ```rust,ignore
//! use ragline::{RagPipeline, RagConfig, InMemoryVectorStore, Document, UserId};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new(1536)))
//!     .build()?;
//!
//! let user = UserId::new("user-1")?;
//! let mut document = Document::new("doc-1", user.clone(), "notes.txt", text);
//! pipeline.ingest(&mut document, &cancel).await?;
//! let context = pipeline.retrieve_context(&user, "search query", &cancel).await?;
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::chunking::{Chunker, FixedSizeChunker};
use crate::config::RagConfig;
use crate::context::{AssembledContext, ContextAssembler};
use crate::document::{Chunk, Document, DocumentStatus, SearchResult, UserId, VectorPoint};
use crate::embedding::EmbeddingProvider;
use crate::error::{FailureCause, RagError, Result};
use crate::filter::{PayloadCondition, SearchFilter, SearchOptions};
use crate::reranker::Reranker;
use crate::vectorstore::VectorStore;

/// The RAG pipeline orchestrator.
///
/// Coordinates document ingestion (chunk → embed → store) and query
/// execution (embed → search → rerank → filter). Construct one via
/// [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    reranker: Option<Arc<dyn Reranker>>,
    assembler: ContextAssembler,
    embedding_permits: Semaphore,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    pub fn context_assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    /// Search options for `user_id` using the configured top-k and threshold.
    pub fn default_options(&self, user_id: &UserId) -> Result<SearchOptions> {
        SearchOptions::new(user_id.clone(), self.config.top_k, self.config.similarity_threshold)
    }

    /// Ingest a single document: chunk → embed → store.
    ///
    /// Walks `document` through its lifecycle and leaves it [`Ready`] on
    /// success or [`Failed`] on any error. Points from the owner's earlier
    /// ingest of the same document id are replaced, and stay untouched when
    /// storing the new version fails. Returns the stored chunks.
    ///
    /// [`Ready`]: DocumentStatus::Ready
    /// [`Failed`]: DocumentStatus::Failed
    pub async fn ingest(
        &self,
        document: &mut Document,
        cancel: &CancellationToken,
    ) -> Result<Vec<Chunk>> {
        match self.run_ingest(document, cancel).await {
            Ok(chunks) => {
                info!(document.id = %document.id, chunk_count = chunks.len(), "ingested document");
                Ok(chunks)
            }
            Err(e) => {
                error!(document.id = %document.id, status = ?document.status, error = %e, "ingestion failed");
                if !document.status.is_terminal() {
                    document.status = DocumentStatus::Failed;
                }
                Err(e)
            }
        }
    }

    async fn run_ingest(
        &self,
        document: &mut Document,
        cancel: &CancellationToken,
    ) -> Result<Vec<Chunk>> {
        let chunks = self.chunker.chunk(&document.id, &document.text)?;
        document.transition(DocumentStatus::Chunked)?;

        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let embeddings = self.embed_concurrently(&texts, cancel).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::provider(
                self.embedding_provider.model_name().to_string(),
                FailureCause::Api,
                format!("expected {} embeddings, received {}", chunks.len(), embeddings.len()),
            ));
        }
        document.transition(DocumentStatus::Embedded)?;

        let points: Vec<VectorPoint> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| VectorPoint::from_chunk(document, chunk, vector))
            .collect();

        // Overwrites the previous version in place; only chunks past the new end remain.
        self.vector_store.upsert(&points, cancel).await?;
        let next_index = chunks.last().map_or(0, |c| c.index + 1);
        let stale = SearchFilter::for_document(document.owner.clone(), document.id.clone())
            .and(PayloadCondition::ChunkIndexAtLeast(next_index));
        self.vector_store.delete_by_filter(&stale, cancel).await?;
        document.transition(DocumentStatus::Ready)?;

        Ok(chunks)
    }

    /// Embed `texts` in batches, with at most `max_concurrent_embeddings`
    /// requests in flight. Output order matches input order.
    async fn embed_concurrently(
        &self,
        texts: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        let batches = texts.chunks(self.config.embedding_batch_size).map(|batch| async move {
            let _permit = self
                .embedding_permits
                .acquire()
                .await
                .map_err(|_| RagError::Cancelled { operation: "embed".into() })?;
            debug!(batch_size = batch.len(), "embedding batch");
            self.embedding_provider.embed_batch(batch, cancel).await
        });

        Ok(try_join_all(batches).await?.into_iter().flatten().collect())
    }

    /// Query with the configured top-k and threshold, scoped to `user_id`.
    pub async fn query(
        &self,
        user_id: &UserId,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        let options = self.default_options(user_id)?;
        self.query_with(&options, query, cancel).await
    }

    /// Query the pipeline: embed → search → rerank → filter by threshold.
    ///
    /// Returns at most `top_k` results owned by the options' user, each at or
    /// above the threshold, ordered by descending score.
    pub async fn query_with(
        &self,
        options: &SearchOptions,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(RagError::Validation("query must not be empty".into()));
        }

        let query_embedding = self.embedding_provider.embed(query, cancel).await?;
        let results = self.vector_store.search(&query_embedding, options, cancel).await?;

        let results = match &self.reranker {
            Some(reranker) => options.finalize(reranker.rerank(query, results, cancel).await?),
            None => results,
        };

        info!(user.id = %options.user_id(), result_count = results.len(), "query completed");
        Ok(results)
    }

    /// Retrieve and assemble context for `query` within the configured budget.
    pub async fn retrieve_context(
        &self,
        user_id: &UserId,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<AssembledContext> {
        let results = self.query(user_id, query, cancel).await?;
        Ok(self.assembler.assemble(&results, self.config.context_token_budget))
    }

    /// Delete every chunk of `document_id` owned by `user_id`.
    ///
    /// Returns the number of chunks removed, or [`RagError::NotFound`] when
    /// the user has no such document.
    pub async fn delete_document(
        &self,
        user_id: &UserId,
        document_id: &str,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let filter = SearchFilter::for_document(user_id.clone(), document_id);
        let count = self.vector_store.count(&filter, cancel).await?;
        if count == 0 {
            return Err(RagError::NotFound(format!("document '{document_id}'")));
        }

        self.vector_store.delete_by_filter(&filter, cancel).await?;
        info!(user.id = %user_id, document.id = document_id, deleted_chunks = count, "deleted document");
        Ok(count)
    }

    pub async fn list_documents(
        &self,
        user_id: &UserId,
        cancel: &CancellationToken,
    ) -> Result<BTreeSet<String>> {
        self.vector_store.list_document_ids_by_user(user_id, cancel).await
    }

    pub async fn count_by_user(&self, user_id: &UserId, cancel: &CancellationToken) -> Result<u64> {
        self.vector_store.count_by_user(user_id, cancel).await
    }

    pub async fn health_check(&self) -> bool {
        self.vector_store.health_check().await
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `embedding_provider` and `vector_store` are required. The chunker
/// defaults to a [`FixedSizeChunker`] built from the config and the context
/// assembler to [`ContextAssembler::default`].
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .vector_store(Arc::new(store))
///     .reranker(Arc::new(reranker))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    reranker: Option<Arc<dyn Reranker>>,
    assembler: Option<ContextAssembler>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set an optional reranker for post-search result reordering.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn context_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = Some(assembler);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if any required field is missing or the
    /// embedding dimensionality differs from the vector store's.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.ok_or_else(|| RagError::Config("config is required".into()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".into()))?;
        let vector_store =
            self.vector_store.ok_or_else(|| RagError::Config("vector_store is required".into()))?;

        if embedding_provider.dimensions() != vector_store.dimensions() {
            return Err(RagError::Config(format!(
                "embedding dimensions ({}) do not match vector store dimensions ({})",
                embedding_provider.dimensions(),
                vector_store.dimensions()
            )));
        }

        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)?),
        };

        Ok(RagPipeline {
            embedding_permits: Semaphore::new(config.max_concurrent_embeddings),
            config,
            embedding_provider,
            vector_store,
            chunker,
            reranker: self.reranker,
            assembler: self.assembler.unwrap_or_default(),
        })
    }
}
