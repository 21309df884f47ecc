//! Configuration for the RAG pipeline.

use serde::{Deserialize, Serialize};

use crate::chunking::MAX_CHUNK_SIZE;
use crate::error::{RagError, Result};

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of top results to return from vector search.
    pub top_k: usize,
    /// Minimum similarity score for results (results below this are filtered out).
    pub similarity_threshold: f32,
    /// Token budget for assembled prompt context.
    pub context_token_budget: usize,
    /// Number of chunk texts sent to the embedding provider per request.
    pub embedding_batch_size: usize,
    /// Maximum number of embedding requests in flight at once.
    pub max_concurrent_embeddings: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 5,
            similarity_threshold: 0.1,
            context_token_budget: 3000,
            embedding_batch_size: 64,
            max_concurrent_embeddings: 4,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of top results to return from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    pub fn context_token_budget(mut self, budget: usize) -> Self {
        self.config.context_token_budget = budget;
        self
    }

    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    pub fn max_concurrent_embeddings(mut self, n: usize) -> Self {
        self.config.max_concurrent_embeddings = n;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_size` is zero or above [`MAX_CHUNK_SIZE`]
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `similarity_threshold` is not within `[-1, 1]`
    /// - `embedding_batch_size` or `max_concurrent_embeddings` is zero
    pub fn build(self) -> Result<RagConfig> {
        let c = &self.config;
        if c.chunk_size == 0 || c.chunk_size > MAX_CHUNK_SIZE {
            return Err(RagError::Config(format!(
                "chunk_size ({}) must be between 1 and {MAX_CHUNK_SIZE}",
                c.chunk_size
            )));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        if c.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if !c.similarity_threshold.is_finite() || !(-1.0..=1.0).contains(&c.similarity_threshold)
        {
            return Err(RagError::Config(format!(
                "similarity_threshold ({}) must be within [-1, 1]",
                c.similarity_threshold
            )));
        }
        if c.embedding_batch_size == 0 {
            return Err(RagError::Config("embedding_batch_size must be greater than zero".into()));
        }
        if c.max_concurrent_embeddings == 0 {
            return Err(RagError::Config(
                "max_concurrent_embeddings must be greater than zero".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let built = RagConfig::builder().build().unwrap();
        assert_eq!(built, RagConfig::default());
        assert_eq!(built.similarity_threshold, 0.1);
    }

    #[test]
    fn rejects_overlap_not_below_size() {
        let err = RagConfig::builder().chunk_size(10).chunk_overlap(10).build().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn rejects_oversized_chunks() {
        assert!(RagConfig::builder().chunk_size(MAX_CHUNK_SIZE + 1).build().is_err());
        assert!(RagConfig::builder().chunk_size(MAX_CHUNK_SIZE).build().is_ok());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        assert!(RagConfig::builder().similarity_threshold(1.5).build().is_err());
        assert!(RagConfig::builder().similarity_threshold(f32::NAN).build().is_err());
    }

    #[test]
    fn rejects_zero_concurrency() {
        assert!(RagConfig::builder().max_concurrent_embeddings(0).build().is_err());
        assert!(RagConfig::builder().embedding_batch_size(0).build().is_err());
        assert!(RagConfig::builder().top_k(0).build().is_err());
    }
}
