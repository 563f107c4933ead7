//! Module inventory handlers: replace and list.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{
    ModuleDto, ModuleFilter, ModuleListResponse, PaginationParams, ReplaceModulesRequest,
    ReplaceModulesResponse,
};
use crate::api::extract::CallerId;
use crate::app_state::AppState;
use crate::domain::{ModuleCategory, ModuleDraft};
use crate::error::{ErrorResponse, LedgerError};

/// `PUT /modules`: Replace the caller's module inventory.
///
/// # Errors
///
/// Returns [`LedgerError`] on a malformed module, a repeated or foreign
/// uuid, or storage failure.
#[utoipa::path(
    put,
    path = "/api/v1/modules",
    tag = "Modules",
    summary = "Replace module inventory",
    description = "Deletes every stored module of the caller and stores the given list in one transaction.",
    request_body = ReplaceModulesRequest,
    params(("x-user-id" = i64, Header, description = "Caller user id")),
    responses(
        (status = 200, description = "Inventory replaced", body = ReplaceModulesResponse),
        (status = 400, description = "Invalid module", body = ErrorResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
    )
)]
pub async fn replace_modules(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(req): Json<ReplaceModulesRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let drafts = req
        .modules
        .into_iter()
        .map(ModuleDraft::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let stored = state.module_service.replace(user_id, &drafts).await?;
    Ok(Json(ReplaceModulesResponse { stored }))
}

/// `GET /modules`: List the caller's modules.
///
/// # Errors
///
/// Returns [`LedgerError`] on an unknown category or storage failure.
#[utoipa::path(
    get,
    path = "/api/v1/modules",
    tag = "Modules",
    summary = "List modules",
    description = "Returns a paginated list of the caller's modules, optionally filtered by category.",
    params(
        ("x-user-id" = i64, Header, description = "Caller user id"),
        ModuleFilter,
        PaginationParams,
    ),
    responses(
        (status = 200, description = "Paginated module list", body = ModuleListResponse),
        (status = 400, description = "Unknown category", body = ErrorResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
    )
)]
pub async fn list_modules(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Query(filter): Query<ModuleFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, LedgerError> {
    let category = filter
        .category
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(str::parse::<ModuleCategory>)
        .transpose()?;
    let modules = state.module_service.list(user_id, category).await?;
    let (page, meta) = pagination.paginate(modules);
    Ok(Json(ModuleListResponse {
        data: page.into_iter().map(ModuleDto::from).collect(),
        pagination: meta,
    }))
}

/// Module inventory routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/modules", get(list_modules).put(replace_modules))
}
