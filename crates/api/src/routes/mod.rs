//! HTTP route handlers.

pub mod health;
pub mod inventory;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod refunds;

use axum::http::HeaderMap;
use common::UserId;
use uuid::Uuid;

use crate::error::ApiError;

/// Caller identity from the `X-User-Id` header.
///
/// Authentication itself lives outside this system; the header stands in
/// for the session collaborator.
pub(crate) fn current_user(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let raw = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing X-User-Id header".to_string()))?;
    let uuid: Uuid = raw
        .parse()
        .map_err(|_| ApiError::BadRequest("X-User-Id must be a UUID".to_string()))?;
    Ok(UserId::from_uuid(uuid))
}
