//! Embedding provider trait for generating vector embeddings from text.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{EmbeddingCache, cache_key};
use crate::error::{FailureCause, RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// Failures are surfaced, never retried here.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world", &cancel).await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    async fn embed_batch(
        &self,
        texts: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text, cancel).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A stable name for the model, used to namespace cache keys.
    fn model_name(&self) -> &str {
        "default"
    }
}

/// Check that an embedding has the provider's dimensionality.
pub fn check_dimensions(provider: &str, expected: usize, embedding: &[f32]) -> Result<()> {
    if embedding.len() != expected {
        return Err(RagError::provider(
            provider,
            FailureCause::Api,
            format!("expected {expected}-dimensional embedding, got {}", embedding.len()),
        ));
    }
    Ok(())
}

/// An [`EmbeddingProvider`] that memoises another one.
///
/// Identical inputs are served from an [`EmbeddingCache`]; batch calls only
/// send cache misses to the wrapped provider.
pub struct CachedEmbeddingProvider<P> {
    inner: P,
    cache: Arc<dyn EmbeddingCache>,
}

impl<P: EmbeddingProvider> CachedEmbeddingProvider<P> {
    pub fn new(inner: P, cache: Arc<dyn EmbeddingCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<dyn EmbeddingCache> {
        &self.cache
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for CachedEmbeddingProvider<P> {
    async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>> {
        let key = cache_key(self.inner.model_name(), text);
        if let Some(hit) = self.cache.get(&key) {
            debug!(model = self.inner.model_name(), "embedding cache hit");
            return Ok(hit);
        }

        let embedding = self.inner.embed(text, cancel).await?;
        self.cache.set(key, embedding.clone());
        Ok(embedding)
    }

    async fn embed_batch(
        &self,
        texts: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        let model = self.inner.model_name();
        let keys: Vec<String> = texts.iter().map(|t| cache_key(model, t)).collect();

        let mut results: Vec<Option<Vec<f32>>> = keys.iter().map(|k| self.cache.get(k)).collect();
        let misses: Vec<usize> =
            results.iter().enumerate().filter(|(_, r)| r.is_none()).map(|(i, _)| i).collect();

        debug!(model, batch_size = texts.len(), misses = misses.len(), "embedding batch");

        if !misses.is_empty() {
            let miss_texts: Vec<&str> = misses.iter().map(|&i| texts[i]).collect();
            let fetched = self.inner.embed_batch(&miss_texts, cancel).await?;
            if fetched.len() != misses.len() {
                return Err(RagError::provider(
                    model,
                    FailureCause::Api,
                    format!("requested {} embeddings, received {}", misses.len(), fetched.len()),
                ));
            }
            for (i, embedding) in misses.into_iter().zip(fetched) {
                self.cache.set(keys[i].clone(), embedding.clone());
                results[i] = Some(embedding);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
