//! Reranker trait for re-scoring search results.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::document::SearchResult;
use crate::error::Result;

/// A reranker that re-scores and reorders search results.
///
/// Implementations can use cross-encoder models, LLM-based scoring, or
/// other strategies to improve precision beyond initial vector similarity.
/// The pipeline re-applies the threshold, ordering and top-k after reranking,
/// so implementations only need to produce scores.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank search results given the original query.
    async fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>>;
}

/// A no-op reranker that returns results unchanged.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::NoOpReranker;
///
/// let reranked = NoOpReranker.rerank("query", results, &cancel).await?;
/// // reranked == results (same order, same scores)
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(
        &self,
        _query: &str,
        results: Vec<SearchResult>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        Ok(results)
    }
}
