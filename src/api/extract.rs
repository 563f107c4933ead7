//! Caller identity extractor.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::LedgerError;

/// Header carrying the authenticated user id, set by the upstream gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller's user id.
///
/// Rejects with [`LedgerError::Unauthenticated`] when the header is
/// missing, not UTF-8, or not a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub i64);

impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = LedgerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or(LedgerError::Unauthenticated)?;
        Ok(Self(id))
    }
}
