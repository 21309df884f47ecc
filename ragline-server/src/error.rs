//! Mapping of failures to HTTP responses.

use std::fmt::Display;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ragline::RagError;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

/// Message returned for every unexpected failure.
pub const GENERIC_ERROR: &str = "Something went wrong. Please try again.";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error(transparent)]
    Internal(RagError),
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Validation(message) => Self::Validation(message),
            RagError::NotFound(message) => Self::NotFound(message),
            other => Self::Internal(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

/// Log `err` under a fresh report id and return the id.
pub fn report_internal(err: &dyn Display) -> Uuid {
    let report_id = Uuid::new_v4();
    error!(%report_id, error = %err, "request failed");
    report_id
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            Self::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": "authentication required" })))
                    .into_response()
            }
            Self::Internal(err) => {
                let report_id = report_internal(&err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": GENERIC_ERROR, "report_id": report_id })),
                )
                    .into_response()
            }
        }
    }
}
