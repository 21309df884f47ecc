//! Vector store trait and lazy initialization state.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::document::{PointId, SearchResult, UserId, VectorPoint};
use crate::error::{RagError, Result};
use crate::filter::{SearchFilter, SearchOptions};

/// A storage backend for vector points with user-scoped similarity search.
///
/// Every implementation talks to a single, preconfigured collection. Search
/// results must satisfy [`SearchOptions::finalize`]: only the requesting
/// user's points, score at or above the threshold, descending order, at most
/// `top_k`.
///
/// # Example
///
/// ```rust,ignore
/// use ragline::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new(384);
/// store.upsert(&points, &cancel).await?;
/// let results = store.search(&query_embedding, &options, &cancel).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace points by id.
    async fn upsert(&self, points: &[VectorPoint], cancel: &CancellationToken) -> Result<()>;

    /// Search for the points most similar to `query`.
    ///
    /// An empty result is a valid outcome.
    async fn search(
        &self,
        query: &[f32],
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>>;

    /// Delete points by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[PointId], cancel: &CancellationToken) -> Result<()>;

    /// Delete every point matching `filter`.
    async fn delete_by_filter(
        &self,
        filter: &SearchFilter,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Count the points matching `filter`.
    async fn count(&self, filter: &SearchFilter, cancel: &CancellationToken) -> Result<u64>;

    /// Count all points owned by `user_id`.
    async fn count_by_user(&self, user_id: &UserId, cancel: &CancellationToken) -> Result<u64> {
        self.count(&SearchFilter::for_user(user_id.clone()), cancel).await
    }

    /// The distinct document ids that have points owned by `user_id`.
    async fn list_document_ids_by_user(
        &self,
        user_id: &UserId,
        cancel: &CancellationToken,
    ) -> Result<BTreeSet<String>>;

    /// Whether the backend is reachable. Never fails.
    async fn health_check(&self) -> bool;

    /// The configured vector dimensionality.
    fn dimensions(&self) -> usize;
}

/// Reject vectors that do not match the store's dimensionality.
pub(crate) fn check_vector_len(expected: usize, vector: &[f32], what: &str) -> Result<()> {
    if vector.len() != expected {
        return Err(RagError::Validation(format!(
            "{what} has {} dimensions, store expects {expected}",
            vector.len()
        )));
    }
    Ok(())
}

/// Where a store is in its one-time setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Runs a store's setup exactly once, on first use.
///
/// Concurrent first callers queue behind one async mutex; only the first runs
/// the setup and the rest observe [`StoreState::Ready`]. A failed setup
/// returns the state to [`StoreState::Uninitialized`] so the next call retries.
#[derive(Debug)]
pub struct StoreInitializer {
    state: RwLock<StoreState>,
    gate: Mutex<()>,
}

impl Default for StoreInitializer {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreInitializer {
    pub fn new() -> Self {
        Self { state: RwLock::new(StoreState::Uninitialized), gate: Mutex::new(()) }
    }

    pub fn state(&self) -> StoreState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: StoreState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Run `init` unless the store is already ready.
    pub async fn ensure<F, Fut>(&self, init: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.state() == StoreState::Ready {
            return Ok(());
        }

        let _gate = self.gate.lock().await;
        if self.state() == StoreState::Ready {
            return Ok(());
        }

        self.set_state(StoreState::Initializing);
        debug!("initializing vector store");
        match init().await {
            Ok(()) => {
                self.set_state(StoreState::Ready);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "vector store initialization failed");
                self.set_state(StoreState::Uninitialized);
                Err(e)
            }
        }
    }
}
