//! JSON:API resource routes. Path segments are wire plurals; handlers resolve the resource type.

use crate::handlers::resource::{create, destroy, find, find_one, related, update};
use crate::state::AppState;
use axum::{routing::get, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// Request bodies above this size are rejected with 413.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/:resource", get(find).post(create))
        .route("/:resource/:id", get(find_one).patch(update).delete(destroy))
        .route("/:resource/:id/:relation", get(related))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
