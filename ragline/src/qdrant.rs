//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragline::qdrant::{QdrantConfig, QdrantVectorStore};
//!
//! let store = QdrantVectorStore::new(QdrantConfig::new("http://localhost:6334", "documents"))?;
//! store.upsert(&points, &cancel).await?;
//! let results = store.search(&query_embedding, &options, &cancel).await?;
//! ```

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, OptimizersConfigDiffBuilder,
    PointId as QdrantPointId, PointStruct, PointsIdsList, Range, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::document::{ChunkPayload, PointId, SearchResult, UserId, VectorPoint};
use crate::error::{FailureCause, RagError, Result};
use crate::filter::{PayloadCondition, SearchFilter, SearchOptions};
use crate::remote::{self, Remote, RemoteCallPolicy};
use crate::vectorstore::{StoreInitializer, StoreState, VectorStore, check_vector_len};

const BACKEND: &str = "qdrant";

/// Payload fields every scoped filter and delete matches on.
const INDEXED_FIELDS: [&str; 2] = ["user_id", "document_id"];

/// Points fetched per scroll page when listing document ids.
const SCROLL_PAGE: u32 = 256;

/// Connection and collection settings for [`QdrantVectorStore`].
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    /// Sent as the `api-key` header when set.
    pub api_key: Option<String>,
    pub collection: String,
    pub vector_size: usize,
    /// Applied to every call.
    pub timeout: Duration,
    /// Segment size (in KB of vectors) above which Qdrant builds an HNSW index.
    pub indexing_threshold: u64,
}

impl QdrantConfig {
    pub fn new(url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            collection: collection.into(),
            vector_size: 1536,
            timeout: remote::DEFAULT_TIMEOUT,
            indexing_threshold: 20_000,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_vector_size(mut self, size: usize) -> Self {
        self.vector_size = size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// The collection is checked (and created if missing, with cosine distance)
/// on the first operation. Payload fields are stored flat so they can be
/// filtered on; `user_id` and `document_id` get keyword indexes.
pub struct QdrantVectorStore {
    client: Qdrant,
    config: QdrantConfig,
    policy: RemoteCallPolicy,
    init: StoreInitializer,
}

impl QdrantVectorStore {
    /// Create a store for the configured URL and collection.
    ///
    /// No network traffic happens until the first operation.
    pub fn new(config: QdrantConfig) -> Result<Self> {
        if config.collection.trim().is_empty() {
            return Err(RagError::Config("qdrant collection name must not be empty".into()));
        }
        if config.vector_size == 0 {
            return Err(RagError::Config("qdrant vector size must be positive".into()));
        }

        let client = Qdrant::from_url(&config.url)
            .api_key(config.api_key.clone())
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| map_err("connect", e))?;
        Ok(Self::from_client(client, config))
    }

    /// Create a store from an existing client.
    pub fn from_client(client: Qdrant, config: QdrantConfig) -> Self {
        let policy = RemoteCallPolicy::new(config.timeout);
        Self { client, config, policy, init: StoreInitializer::new() }
    }

    pub fn state(&self) -> StoreState {
        self.init.state()
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    async fn call<T, Fut>(&self, operation: &str, cancel: &CancellationToken, call: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, QdrantError>>,
    {
        self.policy
            .guard(Remote::Store(BACKEND), operation, cancel, async {
                call.await.map_err(|e| map_err(operation, e))
            })
            .await
    }

    async fn ready(&self, cancel: &CancellationToken) -> Result<()> {
        self.init.ensure(|| self.initialize(cancel)).await
    }

    async fn initialize(&self, cancel: &CancellationToken) -> Result<()> {
        let collection = self.config.collection.as_str();
        self.call("health_check", cancel, self.client.health_check()).await?;

        let exists =
            self.call("collection_exists", cancel, self.client.collection_exists(collection)).await?;
        if exists {
            self.verify_collection(cancel).await?;
        } else {
            self.create_collection(cancel).await?;
        }
        self.ensure_payload_indexes(cancel).await
    }

    async fn create_collection(&self, cancel: &CancellationToken) -> Result<()> {
        let collection = self.config.collection.as_str();
        let create = CreateCollectionBuilder::new(collection)
            .vectors_config(VectorParamsBuilder::new(
                self.config.vector_size as u64,
                Distance::Cosine,
            ))
            .optimizers_config(
                OptimizersConfigDiffBuilder::default()
                    .indexing_threshold(self.config.indexing_threshold),
            );

        match self.call("create_collection", cancel, self.client.create_collection(create)).await {
            Ok(_) => {
                info!(collection, dimensions = self.config.vector_size, "created qdrant collection");
                Ok(())
            }
            // Another process won the creation race.
            Err(RagError::Store { message, .. })
                if message.to_ascii_lowercase().contains("already exists") =>
            {
                debug!(collection, "qdrant collection created concurrently");
                self.verify_collection(cancel).await
            }
            Err(e) => Err(e),
        }
    }

    /// Keyword indexes on the filter fields. Re-creating an existing index is a no-op.
    async fn ensure_payload_indexes(&self, cancel: &CancellationToken) -> Result<()> {
        let collection = self.config.collection.as_str();
        for field in INDEXED_FIELDS {
            self.call(
                "create_field_index",
                cancel,
                self.client.create_field_index(
                    CreateFieldIndexCollectionBuilder::new(collection, field, FieldType::Keyword)
                        .wait(true),
                ),
            )
            .await?;
        }
        Ok(())
    }

    async fn verify_collection(&self, cancel: &CancellationToken) -> Result<()> {
        let collection = self.config.collection.as_str();
        let info =
            self.call("collection_info", cancel, self.client.collection_info(collection)).await?;

        let vectors = info
            .result
            .and_then(|i| i.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config);

        match vectors {
            Some(VectorsConfigKind::Params(params))
                if params.size as usize == self.config.vector_size =>
            {
                debug!(collection, "qdrant collection already exists, skipping creation");
                Ok(())
            }
            Some(VectorsConfigKind::Params(params)) => Err(RagError::Config(format!(
                "collection '{collection}' stores {}-dimensional vectors, expected {}",
                params.size, self.config.vector_size
            ))),
            _ => Err(RagError::Config(format!(
                "collection '{collection}' does not use a single unnamed vector"
            ))),
        }
    }
}

fn map_err(operation: &str, e: QdrantError) -> RagError {
    let message = e.to_string();
    let cause = remote::classify_message(&message);
    error!(backend = BACKEND, operation, %cause, error = %message, "qdrant call failed");
    RagError::store(BACKEND, cause, format!("{operation}: {message}"))
}

fn to_filter(filter: &SearchFilter) -> Filter {
    let mut conditions = vec![Condition::matches("user_id", filter.user_id.to_string())];
    conditions.extend(filter.conditions.iter().map(|c| match c {
        PayloadCondition::DocumentId(id) => Condition::matches(c.field(), id.clone()),
        PayloadCondition::ChunkIndex(index) => Condition::matches(c.field(), i64::from(*index)),
        PayloadCondition::ChunkIndexAtLeast(index) => Condition::range(
            c.field(),
            Range { gte: Some(f64::from(*index)), ..Default::default() },
        ),
        PayloadCondition::Filename(name) => Condition::matches(c.field(), name.clone()),
    }));
    Filter::must(conditions)
}

fn to_point(point: &VectorPoint) -> Result<PointStruct> {
    let json = serde_json::to_value(&point.payload).map_err(|e| {
        RagError::store(BACKEND, FailureCause::Api, format!("failed to encode payload: {e}"))
    })?;
    let payload = Payload::try_from(json).map_err(|e| map_err("encode_payload", e))?;
    Ok(PointStruct::new(point.id.to_string(), point.vector.clone(), payload))
}

/// Extract a string from a Qdrant payload value.
fn extract_string(value: &QdrantValue) -> Option<String> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn extract_u32(value: &QdrantValue) -> Option<u32> {
    match &value.kind {
        Some(Kind::IntegerValue(n)) => u32::try_from(*n).ok(),
        _ => None,
    }
}

fn from_payload(payload: &HashMap<String, QdrantValue>) -> Option<ChunkPayload> {
    let created_at = payload.get("created_at").and_then(extract_string)?;
    Some(ChunkPayload {
        document_id: payload.get("document_id").and_then(extract_string)?,
        user_id: UserId::new(payload.get("user_id").and_then(extract_string)?).ok()?,
        chunk_index: payload.get("chunk_index").and_then(extract_u32)?,
        content: payload.get("content").and_then(extract_string)?,
        filename: payload.get("filename").and_then(extract_string)?,
        created_at: DateTime::parse_from_rfc3339(&created_at).ok()?.with_timezone(&Utc),
    })
}

fn from_point_id(id: Option<&QdrantPointId>) -> Option<PointId> {
    match id?.point_id_options.as_ref()? {
        PointIdOptions::Uuid(s) => Uuid::parse_str(s).ok().map(PointId::from_uuid),
        PointIdOptions::Num(_) => None,
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert(&self, points: &[VectorPoint], cancel: &CancellationToken) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        for point in points {
            check_vector_len(self.config.vector_size, &point.vector, "point vector")?;
        }
        self.ready(cancel).await?;

        let structs = points.iter().map(to_point).collect::<Result<Vec<_>>>()?;
        self.call(
            "upsert",
            cancel,
            self.client.upsert_points(
                UpsertPointsBuilder::new(&self.config.collection, structs).wait(true),
            ),
        )
        .await?;

        debug!(
            collection = %self.config.collection,
            count = points.len(),
            "upserted points to qdrant"
        );
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        check_vector_len(self.config.vector_size, query, "query vector")?;
        self.ready(cancel).await?;

        let response = self
            .call(
                "search",
                cancel,
                self.client.search_points(
                    SearchPointsBuilder::new(
                        &self.config.collection,
                        query.to_vec(),
                        options.top_k() as u64,
                    )
                    .filter(to_filter(&options.filter))
                    .score_threshold(options.threshold())
                    .with_payload(true),
                ),
            )
            .await?;

        let results: Vec<SearchResult> = response
            .result
            .into_iter()
            .filter_map(|scored| {
                let parsed = from_point_id(scored.id.as_ref()).zip(from_payload(&scored.payload));
                if parsed.is_none() {
                    warn!(
                        collection = %self.config.collection,
                        "skipping point with unexpected id or payload"
                    );
                }
                parsed.map(|(id, payload)| SearchResult { id, score: scored.score, payload })
            })
            .collect();

        Ok(options.finalize(results))
    }

    async fn delete(&self, ids: &[PointId], cancel: &CancellationToken) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.ready(cancel).await?;

        let point_ids: Vec<QdrantPointId> = ids.iter().map(|id| id.to_string().into()).collect();
        self.call(
            "delete",
            cancel,
            self.client.delete_points(
                DeletePointsBuilder::new(&self.config.collection)
                    .points(PointsIdsList { ids: point_ids })
                    .wait(true),
            ),
        )
        .await?;

        debug!(
            collection = %self.config.collection,
            count = ids.len(),
            "deleted points from qdrant"
        );
        Ok(())
    }

    async fn delete_by_filter(
        &self,
        filter: &SearchFilter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.ready(cancel).await?;
        self.call(
            "delete_by_filter",
            cancel,
            self.client.delete_points(
                DeletePointsBuilder::new(&self.config.collection)
                    .points(to_filter(filter))
                    .wait(true),
            ),
        )
        .await?;
        Ok(())
    }

    async fn count(&self, filter: &SearchFilter, cancel: &CancellationToken) -> Result<u64> {
        self.ready(cancel).await?;
        let response = self
            .call(
                "count",
                cancel,
                self.client.count(
                    CountPointsBuilder::new(&self.config.collection)
                        .filter(to_filter(filter))
                        .exact(true),
                ),
            )
            .await?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn list_document_ids_by_user(
        &self,
        user_id: &UserId,
        cancel: &CancellationToken,
    ) -> Result<BTreeSet<String>> {
        self.ready(cancel).await?;
        let filter = to_filter(&SearchFilter::for_user(user_id.clone()));
        let mut ids = BTreeSet::new();
        let mut offset: Option<QdrantPointId> = None;

        loop {
            let mut request = ScrollPointsBuilder::new(&self.config.collection)
                .filter(filter.clone())
                .limit(SCROLL_PAGE)
                .with_payload(true)
                .with_vectors(false);
            if let Some(next) = offset.take() {
                request = request.offset(next);
            }

            let page = self.call("scroll", cancel, self.client.scroll(request)).await?;
            ids.extend(
                page.result
                    .iter()
                    .filter_map(|p| p.payload.get("document_id").and_then(extract_string)),
            );

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(ids)
    }

    async fn health_check(&self) -> bool {
        let cancel = CancellationToken::new();
        match self.call("health_check", &cancel, self.client.health_check()).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "qdrant health check failed");
                false
            }
        }
    }

    fn dimensions(&self) -> usize {
        self.config.vector_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_always_includes_user() {
        let filter = to_filter(&SearchFilter::for_document(UserId::new("alice").unwrap(), "doc"));
        assert_eq!(filter.must.len(), 2);
    }

    #[test]
    fn payload_round_trips_through_qdrant_values() {
        let payload = ChunkPayload {
            document_id: "doc".into(),
            user_id: UserId::new("alice").unwrap(),
            chunk_index: 3,
            content: "hello".into(),
            filename: "a.txt".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        let qdrant: Payload = Payload::try_from(json).unwrap();
        let map: HashMap<String, QdrantValue> = qdrant.into();
        let decoded = from_payload(&map).unwrap();
        assert_eq!(decoded.document_id, payload.document_id);
        assert_eq!(decoded.user_id, payload.user_id);
        assert_eq!(decoded.chunk_index, 3);
        assert_eq!(decoded.created_at.timestamp(), payload.created_at.timestamp());
    }

    #[test]
    fn scoping_fields_are_indexed() {
        let filter = to_filter(&SearchFilter::for_document(UserId::new("alice").unwrap(), "doc"));
        assert_eq!(filter.must.len(), INDEXED_FIELDS.len());
        assert!(INDEXED_FIELDS.contains(&PayloadCondition::DocumentId("doc".into()).field()));
    }

    /// Needs a running Qdrant at `QDRANT_URL` (default `http://localhost:6334`).
    #[tokio::test]
    #[ignore]
    async fn existing_collection_gets_payload_indexes() {
        let url = std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://localhost:6334".into());
        let collection = format!("ragline-test-{}", Uuid::new_v4());
        let store = QdrantVectorStore::new(QdrantConfig::new(&url, &collection).with_vector_size(4))
            .unwrap();
        store
            .client
            .create_collection(
                CreateCollectionBuilder::new(&collection)
                    .vectors_config(VectorParamsBuilder::new(4, Distance::Cosine)),
            )
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let filter = SearchFilter::for_user(UserId::new("alice").unwrap());
        assert_eq!(store.count(&filter, &cancel).await.unwrap(), 0);

        let info = store.client.collection_info(&collection).await.unwrap().result.unwrap();
        for field in INDEXED_FIELDS {
            assert!(info.payload_schema.contains_key(field), "missing index on {field}");
        }
        store.client.delete_collection(&collection).await.unwrap();
    }

    #[test]
    fn empty_collection_name_is_rejected() {
        let config = QdrantConfig::new("http://localhost:6334", " ");
        assert!(matches!(QdrantVectorStore::new(config), Err(RagError::Config(_))));
    }
}
