//! Data types for documents, chunks, vector points and search results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RagError, Result};

/// The id of the user that owns documents and vectors.
///
/// Always non-empty. Every search and every bulk delete is scoped by one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Create a user id, rejecting empty or whitespace-only values.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(RagError::Validation("user id must not be empty".into()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = RagError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    Chunked,
    Embedded,
    Ready,
    Failed,
}

impl DocumentStatus {
    /// Whether `self → next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, next),
            (Uploaded, Chunked)
                | (Chunked, Embedded)
                | (Embedded, Ready)
                | (Uploaded | Chunked | Embedded, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

/// A source document owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The user who uploaded the document.
    pub owner: UserId,
    /// Original file name, used for attribution in assembled context.
    pub filename: String,
    /// The raw text content.
    #[serde(skip_serializing)]
    #[serde(default)]
    pub text: String,
    /// Where the document is in the ingest lifecycle.
    pub status: DocumentStatus,
    /// Upload time.
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Create a freshly uploaded document.
    pub fn new(
        id: impl Into<String>,
        owner: UserId,
        filename: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            owner,
            filename: filename.into(),
            text: text.into(),
            status: DocumentStatus::Uploaded,
            created_at: Utc::now(),
        }
    }

    /// Move the document to `next`, rejecting illegal lifecycle steps.
    pub fn transition(&mut self, next: DocumentStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(RagError::Validation(format!(
                "document '{}' cannot move from {:?} to {next:?}",
                self.id, self.status
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// A contiguous window of a [`Document`]'s text.
///
/// Offsets are character (Unicode scalar value) positions and form the
/// half-open range `[start, end)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of this chunk within the document, starting at 0.
    pub index: u32,
    pub start: usize,
    pub end: usize,
    /// The text of `[start, end)`.
    pub content: String,
}

impl Chunk {
    /// Number of characters covered.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The deterministic point id this chunk is stored under for `owner`.
    pub fn point_id(&self, owner: &UserId) -> PointId {
        PointId::for_chunk(owner, &self.document_id, self.index)
    }
}

/// Identifier of a stored vector point.
///
/// Derived as a UUIDv5 of `"{user_id}:{document_id}:{chunk_index}"`, so
/// re-ingesting a document overwrites its owner's previous points and never
/// another user's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointId(Uuid);

impl PointId {
    pub fn for_chunk(user_id: &UserId, document_id: &str, chunk_index: u32) -> Self {
        let name = format!("{user_id}:{document_id}:{chunk_index}");
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Payload stored alongside every vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkPayload {
    pub document_id: String,
    pub user_id: UserId,
    pub chunk_index: u32,
    pub content: String,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

/// A vector with its id and payload, ready for upsert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorPoint {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl VectorPoint {
    /// Build the point for `chunk` of `document` with its embedding.
    pub fn from_chunk(document: &Document, chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.point_id(&document.owner),
            vector,
            payload: ChunkPayload {
                document_id: document.id.clone(),
                user_id: document.owner.clone(),
                chunk_index: chunk.index,
                content: chunk.content.clone(),
                filename: document.filename.clone(),
                created_at: document.created_at,
            },
        }
    }
}

/// A retrieved point paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub id: PointId,
    /// The similarity score (higher is more relevant).
    pub score: f32,
    pub payload: ChunkPayload,
}
