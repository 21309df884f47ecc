//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. It is suitable for
//! development, testing, and small-scale use cases.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::document::{PointId, SearchResult, UserId, VectorPoint};
use crate::error::{RagError, Result};
use crate::filter::{SearchFilter, SearchOptions};
use crate::vectorstore::{VectorStore, check_vector_len};

/// An in-memory vector store using cosine similarity for search.
///
/// Points are keyed by [`PointId`], so upserting an existing id replaces it.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new(384);
/// store.upsert(&points, &cancel).await?;
/// ```
#[derive(Debug)]
pub struct InMemoryVectorStore {
    dimensions: usize,
    points: RwLock<HashMap<PointId, VectorPoint>>,
}

impl InMemoryVectorStore {
    /// Create a new empty store for vectors of `dimensions` length.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, points: RwLock::new(HashMap::new()) }
    }

    /// Fetch a stored point by id.
    pub async fn get(&self, id: &PointId) -> Option<VectorPoint> {
        self.points.read().await.get(id).cloned()
    }

    /// Total number of stored points across all users.
    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

fn cancelled(cancel: &CancellationToken, operation: &str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(RagError::Cancelled { operation: operation.to_string() });
    }
    Ok(())
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, points: &[VectorPoint], cancel: &CancellationToken) -> Result<()> {
        cancelled(cancel, "upsert")?;
        for point in points {
            check_vector_len(self.dimensions, &point.vector, "point vector")?;
        }

        let mut store = self.points.write().await;
        for point in points {
            store.insert(point.id, point.clone());
        }
        debug!(count = points.len(), "upserted points into memory");
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        cancelled(cancel, "search")?;
        check_vector_len(self.dimensions, query, "query vector")?;

        let store = self.points.read().await;
        let scored: Vec<SearchResult> = store
            .values()
            .filter(|point| options.filter.matches(&point.payload))
            .map(|point| SearchResult {
                id: point.id,
                score: cosine_similarity(&point.vector, query),
                payload: point.payload.clone(),
            })
            .collect();

        Ok(options.finalize(scored))
    }

    async fn delete(&self, ids: &[PointId], cancel: &CancellationToken) -> Result<()> {
        cancelled(cancel, "delete")?;
        let mut store = self.points.write().await;
        for id in ids {
            store.remove(id);
        }
        Ok(())
    }

    async fn delete_by_filter(
        &self,
        filter: &SearchFilter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        cancelled(cancel, "delete_by_filter")?;
        let mut store = self.points.write().await;
        store.retain(|_, point| !filter.matches(&point.payload));
        Ok(())
    }

    async fn count(&self, filter: &SearchFilter, cancel: &CancellationToken) -> Result<u64> {
        cancelled(cancel, "count")?;
        let store = self.points.read().await;
        Ok(store.values().filter(|p| filter.matches(&p.payload)).count() as u64)
    }

    async fn list_document_ids_by_user(
        &self,
        user_id: &UserId,
        cancel: &CancellationToken,
    ) -> Result<BTreeSet<String>> {
        cancelled(cancel, "list_document_ids_by_user")?;
        let store = self.points.read().await;
        Ok(store
            .values()
            .filter(|p| p.payload.user_id == *user_id)
            .map(|p| p.payload.document_id.clone())
            .collect())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
