//! Typed errors and HTTP mapping. Every error leaves the API as a JSON:API error document.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::response::JSON_API_MEDIA_TYPE;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: model {model} attribute {attribute}")]
    InvalidPrimaryKey { model: String, attribute: String },
    #[error("duplicate {kind}: {name}")]
    Duplicate { kind: &'static str, name: String },
    #[error("invalid association {model}.{alias}: {reason}")]
    InvalidAssociation {
        model: String,
        alias: String,
        reason: String,
    },
    #[error("config load: {0}")]
    Load(String),
}

/// Errors raised by a [`Store`](crate::store::Store) implementation. Translated into
/// [`ApiError`] exactly once, at the service boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unknown resource type: {0}")]
    UnknownType(String),
    #[error("unknown association {resource}.{alias}")]
    UnknownAssociation { resource: String, alias: String },
    #[error("record not found")]
    NotFound,
    #[error("value for '{attribute}' must be unique")]
    Unique { attribute: String },
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("store: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unsupported include: {}", .0.join(", "))]
    UnsupportedInclude(Vec<String>),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not acceptable: {0}")]
    NotAcceptable(String),
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("uniqueness: {0}")]
    Uniqueness(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownType(t) => ApiError::NotFound(format!("resource type {}", t)),
            StoreError::UnknownAssociation { resource, alias } => {
                ApiError::NotFound(format!("relationship {}.{}", resource, alias))
            }
            StoreError::NotFound => ApiError::NotFound("record".into()),
            StoreError::Unique { attribute } => {
                ApiError::Uniqueness(format!("value for '{}' must be unique", attribute))
            }
            StoreError::InvalidValue(msg) => ApiError::Validation(msg),
            StoreError::Db(sqlx::Error::RowNotFound) => ApiError::NotFound("record".into()),
            StoreError::Db(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                ApiError::Uniqueness(db.message().to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Config(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::UnsupportedInclude(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) | ApiError::Uniqueness(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ApiError::Config(_) | ApiError::Internal(_) => "Server Error",
            ApiError::UnsupportedInclude(_) => "Unsupported Include Param",
            ApiError::BadRequest(_) => "Bad Request",
            ApiError::NotFound(_) => "Not Found",
            ApiError::NotAcceptable(_) => "Not Acceptable",
            ApiError::UnsupportedMediaType(_) => "Unsupported Media Type",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Validation(_) => "Validation Error",
            ApiError::Uniqueness(_) => "Uniqueness Constraint Upheld",
        }
    }

    /// JSON:API error document for this error.
    pub fn to_document(&self) -> ErrorDocument {
        ErrorDocument {
            errors: vec![ErrorObject {
                title: self.title().to_string(),
                detail: self.to_string(),
                status: Some(self.status().as_u16().to_string()),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDocument {
    pub errors: Vec<ErrorObject>,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub title: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (
            status,
            [(header::CONTENT_TYPE, JSON_API_MEDIA_TYPE)],
            Json(self.to_document()),
        )
            .into_response()
    }
}
