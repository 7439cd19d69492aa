//! JSON:API response envelope helpers.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// The JSON:API media type, sent on every response and required on request bodies.
pub const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";

/// A serializable body sent with the JSON:API content type.
pub struct JsonApi<T> {
    pub status: StatusCode,
    pub body: T,
}

impl<T: Serialize> IntoResponse for JsonApi<T> {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, JSON_API_MEDIA_TYPE)],
            Json(self.body),
        )
            .into_response()
    }
}

pub fn ok<T: Serialize>(body: T) -> JsonApi<T> {
    JsonApi {
        status: StatusCode::OK,
        body,
    }
}

pub fn created<T: Serialize>(body: T) -> JsonApi<T> {
    JsonApi {
        status: StatusCode::CREATED,
        body,
    }
}

pub fn no_content() -> Response {
    (
        StatusCode::NO_CONTENT,
        [(header::CONTENT_TYPE, JSON_API_MEDIA_TYPE)],
    )
        .into_response()
}
