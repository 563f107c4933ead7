//! System endpoints: health check and scoring tables.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::domain::scoring_tables::ScoringTablesView;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health`: Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /config/scoring-tables`: Static optimizer scoring tables.
#[utoipa::path(
    get,
    path = "/config/scoring-tables",
    tag = "System",
    summary = "Scoring tables",
    description = "Returns the level thresholds, attribute types and power tables the optimizer scores with.",
    responses(
        (status = 200, description = "Scoring tables", body = ScoringTablesView),
    )
)]
pub async fn scoring_tables_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(ScoringTablesView::current()))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/scoring-tables", get(scoring_tables_handler))
}
