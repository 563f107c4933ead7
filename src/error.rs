//! Ledger error types with HTTP status code mapping.
//!
//! [`LedgerError`] is the central error type for the service. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//! Messages are written for end users: storage details, hashes and
//! internal identifiers are logged, never rendered.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1101,
///     "message": "not enough modules: need 4, have 2",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`LedgerError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                |
/// |-----------|-----------------|----------------------------|
/// | 1000–1099 | Validation      | 400 Bad Request            |
/// | 1100–1199 | Input shortfall | 400 Bad Request            |
/// | 1200–1299 | Identity        | 401 Unauthorized           |
/// | 2000–2999 | Not Found       | 404 Not Found              |
/// | 3000–3999 | Server          | 500 Internal Server Error  |
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Unrecognized module category string.
    #[error("invalid category: {0}")]
    InvalidCategory(String),

    /// Fewer modules than a four-slot loadout needs.
    #[error("not enough modules: need {required}, have {available}")]
    InsufficientModules {
        /// Modules a loadout requires.
        required: usize,
        /// Modules left after filtering.
        available: usize,
    },

    /// Caller identity is missing or malformed.
    #[error("missing or invalid caller identity")]
    Unauthenticated,

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transaction or query failure.
    #[error("storage failure")]
    Storage(String),

    /// Internal server error.
    #[error("internal error")]
    Internal(String),
}

impl LedgerError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::InvalidCategory(_) => 1002,
            Self::InsufficientModules { .. } => 1101,
            Self::Unauthenticated => 1201,
            Self::NotFound(_) => 2001,
            Self::Internal(_) => 3000,
            Self::Storage(_) => 3001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidCategory(_) | Self::InsufficientModules { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for LedgerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::Storage(detail) | Self::Internal(detail) => {
                tracing::error!(code = self.error_code(), %detail, "request failed");
            }
            _ => {}
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
