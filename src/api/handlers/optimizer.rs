//! Loadout optimizer handler.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{OptimizeRequest, OptimizeResponse};
use crate::api::extract::CallerId;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, LedgerError};

/// `POST /module-optimizer/optimize`: Best four-module loadouts.
///
/// # Errors
///
/// Returns [`LedgerError`] on invalid parameters, fewer than four eligible
/// modules, or storage failure.
#[utoipa::path(
    post,
    path = "/api/v1/module-optimizer/optimize",
    tag = "Optimizer",
    summary = "Optimize module loadout",
    description = "Searches the caller's modules of one category for the highest-scoring four-module combinations. Results are cached per request.",
    request_body = OptimizeRequest,
    params(("x-user-id" = i64, Header, description = "Caller user id")),
    responses(
        (status = 200, description = "Ranked solutions", body = OptimizeResponse),
        (status = 400, description = "Invalid request or not enough modules", body = ErrorResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
    )
)]
pub async fn optimize(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(req): Json<OptimizeRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let params = req.into_params(state.default_solutions)?;
    let outcome = state.optimizer_service.optimize(user_id, params).await?;
    Ok(Json(OptimizeResponse::from(outcome)))
}

/// Optimizer routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/module-optimizer/optimize", post(optimize))
}
