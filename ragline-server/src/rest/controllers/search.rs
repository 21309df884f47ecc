use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use ragline::{SearchOptions, SearchResult};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: Option<usize>,
    pub threshold: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

/// POST /api/search
///
/// Unset `top_k` and `threshold` fall back to the pipeline configuration.
pub async fn search(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(request) = payload?;
    let config = state.pipeline.config();
    let options = SearchOptions::new(
        user,
        request.top_k.unwrap_or(config.top_k),
        request.threshold.unwrap_or(config.similarity_threshold),
    )?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let results = state.pipeline.query_with(&options, &request.query, &cancel).await?;

    Ok(Json(SearchResponse { results }))
}
