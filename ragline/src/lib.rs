//! # ragline
//!
//! Retrieval core for user-scoped, retrieval-augmented chat.
//!
//! ## Overview
//!
//! Documents are split into overlapping character windows, embedded, and
//! stored as vectors tagged with their owner. Queries are embedded, searched
//! with a mandatory owner filter, and the best matches are packed into a
//! token-budgeted context for a chat model.
//!
//! - [`TokenCounter`] - token estimates and budget fitting
//! - [`FixedSizeChunker`] - overlapping fixed-size windows
//! - [`EmbeddingProvider`] / [`CachedEmbeddingProvider`] - embeddings with an LRU cache
//! - [`VectorStore`] - [`InMemoryVectorStore`] and, with `qdrant`, `QdrantVectorStore`
//! - [`ContextAssembler`] - greedy context packing with source attribution
//! - [`RagPipeline`] - ingest, query, context retrieval and deletion
//!
//! ## Features
//!
//! - `openai` - OpenAI embedding and chat providers
//! - `qdrant` - Qdrant vector store
//! - `full` - everything
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragline::{InMemoryVectorStore, MockEmbeddingProvider, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(MockEmbeddingProvider::new(64)))
//!     .vector_store(Arc::new(InMemoryVectorStore::new(64)))
//!     .build()?;
//! ```

pub mod cache;
pub mod chat;
pub mod chunking;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod inmemory;
pub mod mock;
#[cfg(feature = "openai")]
pub mod openai;
pub mod pipeline;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod remote;
pub mod reranker;
pub mod token;
pub mod vectorstore;

pub use cache::{EmbeddingCache, LruEmbeddingCache, cache_key};
pub use chat::{ChatMessage, ChatModel, ChatRole, ChatStream};
pub use chunking::{Chunker, FixedSizeChunker, MAX_CHUNK_SIZE};
pub use config::{RagConfig, RagConfigBuilder};
pub use context::{AssembledContext, ContextAssembler, ContextSource};
pub use document::{
    Chunk, ChunkPayload, Document, DocumentStatus, PointId, SearchResult, UserId, VectorPoint,
};
pub use embedding::{CachedEmbeddingProvider, EmbeddingProvider};
pub use error::{FailureCause, RagError, Result};
pub use filter::{PayloadCondition, SearchFilter, SearchOptions};
pub use inmemory::InMemoryVectorStore;
pub use mock::{MockChatModel, MockEmbeddingProvider};
#[cfg(feature = "openai")]
pub use openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
pub use pipeline::{RagPipeline, RagPipelineBuilder};
#[cfg(feature = "qdrant")]
pub use qdrant::{QdrantConfig, QdrantVectorStore};
pub use remote::RemoteCallPolicy;
pub use reranker::{NoOpReranker, Reranker};
pub use token::{CharRatioTokenCounter, TokenCounter};
pub use vectorstore::{StoreInitializer, StoreState, VectorStore};
