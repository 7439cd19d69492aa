//! Resource handlers: find, findOne, relationship endpoint, create, update, destroy.

use crate::error::ApiError;
use crate::extractors::{JsonApiBody, Negotiated, QueryParams};
use crate::response::{created, no_content, ok};
use crate::service::BlueprintService;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
};

pub async fn find(
    _: Negotiated,
    State(state): State<AppState>,
    Path(resource): Path<String>,
    QueryParams(params): QueryParams,
) -> Result<Response, ApiError> {
    let doc = BlueprintService::find(&state, &resource, &params).await?;
    Ok(ok(doc).into_response())
}

pub async fn find_one(
    _: Negotiated,
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    QueryParams(params): QueryParams,
) -> Result<Response, ApiError> {
    let doc = BlueprintService::find_one(&state, &resource, &id, &params).await?;
    Ok(ok(doc).into_response())
}

pub async fn related(
    _: Negotiated,
    State(state): State<AppState>,
    Path((resource, id, relation)): Path<(String, String, String)>,
    QueryParams(params): QueryParams,
) -> Result<Response, ApiError> {
    let doc = BlueprintService::populate(&state, &resource, &id, &relation, &params).await?;
    Ok(ok(doc).into_response())
}

pub async fn create(
    _: Negotiated,
    State(state): State<AppState>,
    Path(resource): Path<String>,
    JsonApiBody(body): JsonApiBody,
) -> Result<Response, ApiError> {
    let doc = BlueprintService::create(&state, &resource, &body).await?;
    Ok(created(doc).into_response())
}

pub async fn update(
    _: Negotiated,
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    JsonApiBody(body): JsonApiBody,
) -> Result<Response, ApiError> {
    let doc = BlueprintService::update(&state, &resource, &id, &body).await?;
    Ok(ok(doc).into_response())
}

pub async fn destroy(
    _: Negotiated,
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    BlueprintService::destroy(&state, &resource, &id).await?;
    Ok(no_content())
}
