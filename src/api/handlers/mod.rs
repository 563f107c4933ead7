//! REST endpoint handlers organized by resource.

pub mod modules;
pub mod optimizer;
pub mod system;
pub mod upload;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(upload::routes())
        .merge(modules::routes())
        .merge(optimizer::routes())
}
