//! Membership lookup for privileged UIs, behind a Bearer access token.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::config::Config;
use crate::jwt::{JwtKeys, verify_access_token};
use crate::store::memberships::{self, Membership};

#[derive(Debug, Serialize, ToSchema)]
pub struct MembershipsResponse {
    pub memberships: Vec<Membership>,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.trim().strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

#[utoipa::path(
    get,
    path = "/api/memberships",
    responses(
        (status = 200, description = "Memberships of the token's user", body = MembershipsResponse),
        (status = 401, description = "Missing or invalid access token")
    ),
    tag = "auth"
)]
pub async fn memberships(
    Extension(pool): Extension<SqlitePool>,
    Extension(config): Extension<Arc<Config>>,
    Extension(keys): Extension<Arc<JwtKeys>>,
    headers: HeaderMap,
) -> Response {
    let claims = bearer_token(&headers)
        .and_then(|token| verify_access_token(&keys, config.auth_domain(), token));
    let Some(claims) = claims else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid_token"})),
        )
            .into_response();
    };

    match memberships::list_for_user(&pool, &claims.sub).await {
        Ok(memberships) => {
            (StatusCode::OK, Json(MembershipsResponse { memberships })).into_response()
        }
        Err(err) => {
            error!("failed to list memberships: {err:#}");
            super::internal_error()
        }
    }
}
