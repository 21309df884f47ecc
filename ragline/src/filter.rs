//! User-scoped filters and search options.
//!
//! A [`SearchFilter`] cannot be built without a [`UserId`], so every query
//! and every bulk delete is scoped to one user at the type level. Extra
//! conditions are a closed set of payload fields, ANDed together.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{ChunkPayload, SearchResult, UserId};
use crate::error::{RagError, Result};

/// A match on one payload field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum PayloadCondition {
    DocumentId(String),
    ChunkIndex(u32),
    /// `chunk_index >= n`.
    ChunkIndexAtLeast(u32),
    Filename(String),
}

impl PayloadCondition {
    /// The payload key this condition matches on.
    pub fn field(&self) -> &'static str {
        match self {
            Self::DocumentId(_) => "document_id",
            Self::ChunkIndex(_) | Self::ChunkIndexAtLeast(_) => "chunk_index",
            Self::Filename(_) => "filename",
        }
    }

    pub fn matches(&self, payload: &ChunkPayload) -> bool {
        match self {
            Self::DocumentId(id) => payload.document_id == *id,
            Self::ChunkIndex(index) => payload.chunk_index == *index,
            Self::ChunkIndexAtLeast(index) => payload.chunk_index >= *index,
            Self::Filename(name) => payload.filename == *name,
        }
    }
}

/// A filter that always includes `user_id = <user>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub user_id: UserId,
    #[serde(default)]
    pub conditions: Vec<PayloadCondition>,
}

impl SearchFilter {
    pub fn for_user(user_id: UserId) -> Self {
        Self { user_id, conditions: Vec::new() }
    }

    /// Restrict to a single document of this user.
    pub fn for_document(user_id: UserId, document_id: impl Into<String>) -> Self {
        Self::for_user(user_id).and(PayloadCondition::DocumentId(document_id.into()))
    }

    /// Add a condition, ANDed with the existing ones.
    pub fn and(mut self, condition: PayloadCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn matches(&self, payload: &ChunkPayload) -> bool {
        payload.user_id == self.user_id && self.conditions.iter().all(|c| c.matches(payload))
    }
}

/// Parameters of a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub filter: SearchFilter,
    top_k: usize,
    threshold: f32,
}

impl SearchOptions {
    /// Create validated options.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Validation`] if `top_k == 0` or `threshold` is not
    /// a finite value in `[-1, 1]`.
    pub fn new(user_id: UserId, top_k: usize, threshold: f32) -> Result<Self> {
        if top_k == 0 {
            return Err(RagError::Validation("top_k must be greater than zero".into()));
        }
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            return Err(RagError::Validation(format!(
                "similarity threshold must be within [-1, 1], got {threshold}"
            )));
        }
        Ok(Self { filter: SearchFilter::for_user(user_id), top_k, threshold })
    }

    /// Add a payload condition.
    pub fn with_condition(mut self, condition: PayloadCondition) -> Self {
        self.filter = self.filter.and(condition);
        self
    }

    pub fn user_id(&self) -> &UserId {
        &self.filter.user_id
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Enforce the search contract on raw backend output.
    ///
    /// Drops results that do not match the filter or fall below the
    /// threshold, sorts by descending score and keeps at most `top_k`.
    pub fn finalize(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        let before = results.len();
        let mut kept: Vec<SearchResult> = results
            .into_iter()
            .filter(|r| r.score >= self.threshold && self.filter.matches(&r.payload))
            .collect();

        kept.sort_by(|a, b| b.score.total_cmp(&a.score));
        kept.truncate(self.top_k);

        if kept.len() < before {
            debug!(
                user_id = %self.filter.user_id,
                dropped = before - kept.len(),
                "discarded search results outside filter, threshold or top_k"
            );
        }
        kept
    }
}
