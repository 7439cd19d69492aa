//! JSON:API content negotiation.
//!
//! [`Negotiated`] rejects requests whose `Accept` header lists the JSON:API media type only with
//! media type parameters (406). [`JsonApiBody`] requires `Content-Type` to be exactly the
//! JSON:API media type (415) and parses the body.

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap},
};
use serde_json::Value;

use crate::error::ApiError;
use crate::response::JSON_API_MEDIA_TYPE;

/// Marker extractor: the client accepts an unparameterized JSON:API response.
#[derive(Clone, Copy, Debug)]
pub struct Negotiated;

fn media_type(entry: &str) -> (&str, bool) {
    match entry.split_once(';') {
        Some((mt, params)) => (mt.trim(), !params.trim().is_empty()),
        None => (entry.trim(), false),
    }
}

/// `Accept` fails only when every JSON:API entry carries parameters.
pub fn check_accept(headers: &HeaderMap) -> Result<(), ApiError> {
    let entries: Vec<(&str, bool)> = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(media_type)
        .filter(|(mt, _)| mt.eq_ignore_ascii_case(JSON_API_MEDIA_TYPE))
        .collect();
    if !entries.is_empty() && entries.iter().all(|(_, has_params)| *has_params) {
        return Err(ApiError::NotAcceptable(format!(
            "{} must be accepted without media type parameters",
            JSON_API_MEDIA_TYPE
        )));
    }
    Ok(())
}

pub fn check_content_type(headers: &HeaderMap) -> Result<(), ApiError> {
    let value = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    match value {
        Some(v) if v.trim() == JSON_API_MEDIA_TYPE => Ok(()),
        Some(v) => Err(ApiError::UnsupportedMediaType(format!(
            "expected {}, got {}",
            JSON_API_MEDIA_TYPE, v
        ))),
        None => Err(ApiError::UnsupportedMediaType(format!(
            "Content-Type {} is required",
            JSON_API_MEDIA_TYPE
        ))),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Negotiated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        check_accept(&parts.headers)?;
        Ok(Negotiated)
    }
}

/// A JSON:API request document.
#[derive(Clone, Debug)]
pub struct JsonApiBody(pub Value);

#[async_trait]
impl<S> FromRequest<S> for JsonApiBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        check_content_type(req.headers())?;
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {}", e)))?;
        Ok(JsonApiBody(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use yare::parameterized;

    fn headers(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(name, HeaderValue::from_str(value).unwrap());
        h
    }

    #[parameterized(
        plain = { "application/vnd.api+json", true },
        wildcard = { "*/*", true },
        one_plain_one_param = { "application/vnd.api+json; ext=bulk, application/vnd.api+json", true },
        only_params = { "application/vnd.api+json; ext=bulk", false },
    )]
    fn test_accept(value: &str, ok: bool) {
        assert_eq!(check_accept(&headers(header::ACCEPT, value)).is_ok(), ok);
    }

    #[test]
    fn test_content_type() {
        assert!(check_content_type(&headers(header::CONTENT_TYPE, JSON_API_MEDIA_TYPE)).is_ok());
        assert!(matches!(
            check_content_type(&headers(header::CONTENT_TYPE, "application/json")),
            Err(ApiError::UnsupportedMediaType(_))
        ));
        assert!(matches!(
            check_content_type(&headers(header::CONTENT_TYPE, "application/vnd.api+json; charset=utf-8")),
            Err(ApiError::UnsupportedMediaType(_))
        ));
        assert!(check_content_type(&HeaderMap::new()).is_err());
        assert!(check_accept(&HeaderMap::new()).is_ok());
    }
}
