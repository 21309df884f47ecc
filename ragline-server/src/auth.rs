//! Caller identity.
//!
//! Authentication happens upstream; the gateway forwards the verified user
//! id in the [`USER_ID_HEADER`] header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use ragline::UserId;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller. Rejects the request with 401 when absent.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub UserId);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthenticated)?;
        let user_id = UserId::new(raw.trim()).map_err(|_| ApiError::Unauthenticated)?;
        Ok(Self(user_id))
    }
}
