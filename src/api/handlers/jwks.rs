//! Verification-key discovery document.

use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::jwt::{JwtKeys, jwks};

#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    responses(
        (status = 200, description = "Public verification keys", body = jwks::JwksDocument),
        (status = 304, description = "Document unchanged")
    ),
    tag = "system"
)]
pub async fn jwks_document(
    Extension(keys): Extension<Arc<JwtKeys>>,
    request_headers: HeaderMap,
) -> impl IntoResponse {
    let (body, etag) = jwks::cached_body(&keys);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Ok(value) = HeaderValue::from_str(etag) {
        headers.insert(header::ETAG, value);
    }

    let unchanged = request_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == etag);
    if unchanged {
        return (StatusCode::NOT_MODIFIED, headers, String::new());
    }

    (StatusCode::OK, headers, body.clone())
}
