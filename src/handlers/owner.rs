//! Caller identity as supplied by the upstream authentication layer.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::errors::AppError;

/// Header carrying the already-authenticated owner id.
pub const OWNER_HEADER: &str = "x-owner-id";

/// The owner making the request. This service trusts the header as-is;
/// authentication happens in front of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OwnerId(pub Uuid);

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized(format!("missing {OWNER_HEADER} header")))?;
        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| AppError::unauthorized(format!("malformed {OWNER_HEADER} header")))?;
        Ok(OwnerId(id))
    }
}
