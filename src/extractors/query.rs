//! Raw query pairs with repeated keys preserved. A malformed query string fails as a JSON:API
//! error document instead of axum's plain-text rejection.

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};

use crate::error::ApiError;

#[derive(Clone, Debug, Default)]
pub struct QueryParams(pub Vec<(String, String)>);

#[async_trait]
impl<S> FromRequestParts<S> for QueryParams
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) = Query::<Vec<(String, String)>>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(QueryParams(pairs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(uri: &str) -> Vec<(String, String)> {
        let (mut parts, _) = Request::builder().uri(uri).body(()).unwrap().into_parts();
        QueryParams::from_request_parts(&mut parts, &()).await.unwrap().0
    }

    #[tokio::test]
    async fn test_repeated_keys_preserved() {
        let pairs = extract("/authors?name%5B%5D=Ann&name%5B%5D=Bob&fields%5Bauthors%5D=name").await;
        assert_eq!(
            pairs,
            vec![
                ("name[]".to_string(), "Ann".to_string()),
                ("name[]".to_string(), "Bob".to_string()),
                ("fields[authors]".to_string(), "name".to_string()),
            ]
        );
        assert!(extract("/authors").await.is_empty());
    }
}
