//! Upload handlers: encounter ingestion and preflight hash checks.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{
    CheckHashesRequest, CheckHashesResponse, UploadEncountersRequest, UploadEncountersResponse,
};
use crate::api::extract::CallerId;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, LedgerError};

/// `POST /upload/encounters`: Ingest a batch of encounters.
///
/// # Errors
///
/// Returns [`LedgerError`] on an invalid batch or storage failure; the
/// whole batch is rolled back in either case.
#[utoipa::path(
    post,
    path = "/api/v1/upload/encounters",
    tag = "Upload",
    summary = "Upload encounters",
    description = "Stores each encounter unless an exact or fuzzy duplicate already exists. `ids[i]` is the stored id for `encounters[i]`.",
    request_body = UploadEncountersRequest,
    params(("x-user-id" = i64, Header, description = "Caller user id")),
    responses(
        (status = 200, description = "Batch committed", body = UploadEncountersResponse),
        (status = 400, description = "Invalid batch", body = ErrorResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
    )
)]
pub async fn upload_encounters(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(req): Json<UploadEncountersRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let report = state
        .upload_service
        .ingest(user_id, &req.encounters)
        .await?;
    Ok(Json(UploadEncountersResponse::from(report)))
}

/// `POST /upload/check`: Report which hashes are already stored.
///
/// # Errors
///
/// Returns [`LedgerError`] on an empty or oversized list or storage failure.
#[utoipa::path(
    post,
    path = "/api/v1/upload/check",
    tag = "Upload",
    summary = "Preflight hash check",
    description = "Matches each hash against stored fingerprints and client source hashes.",
    request_body = CheckHashesRequest,
    params(("x-user-id" = i64, Header, description = "Caller user id")),
    responses(
        (status = 200, description = "Hashes partitioned", body = CheckHashesResponse),
        (status = 400, description = "Invalid hash list", body = ErrorResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
    )
)]
pub async fn check_hashes(
    State(state): State<AppState>,
    CallerId(_caller): CallerId,
    Json(req): Json<CheckHashesRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let report = state.upload_service.check_hashes(&req.hashes).await?;
    Ok(Json(CheckHashesResponse::from(report)))
}

/// Upload routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/upload/encounters", post(upload_encounters))
        .route("/upload/check", post(check_hashes))
}
