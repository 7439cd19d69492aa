//! Router assembly.

mod common;
mod resource;

pub use common::common_routes;
pub use resource::{resource_routes, MAX_BODY_BYTES};

use crate::state::AppState;
use axum::Router;

/// Common routes merged with the resource routes. Common paths win over `/:resource`.
pub fn app(state: AppState) -> Router {
    common_routes(state.clone()).merge(resource_routes(state))
}
