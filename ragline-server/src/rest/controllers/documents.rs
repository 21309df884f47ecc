use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use ragline::Document;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document: Document,
    pub chunk_count: usize,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub document_ids: Vec<String>,
    pub chunk_count: u64,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted_chunks: u64,
}

/// POST /api/documents
pub async fn upload(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let Json(request) = payload?;
    if request.filename.trim().is_empty() {
        return Err(ApiError::Validation("filename must not be empty".into()));
    }

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let mut document =
        Document::new(Uuid::new_v4().to_string(), user, request.filename, request.content);
    let chunks = state.pipeline.ingest(&mut document, &cancel).await?;

    Ok((StatusCode::CREATED, Json(UploadResponse { document, chunk_count: chunks.len() })))
}

/// GET /api/documents
pub async fn list(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<ListResponse>, ApiError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let document_ids = state.pipeline.list_documents(&user, &cancel).await?;
    let chunk_count = state.pipeline.count_by_user(&user, &cancel).await?;

    Ok(Json(ListResponse { document_ids: document_ids.into_iter().collect(), chunk_count }))
}

/// DELETE /api/documents/{id}
pub async fn remove(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let deleted_chunks = state.pipeline.delete_document(&user, &id, &cancel).await?;

    Ok(Json(DeleteResponse { deleted_chunks }))
}
