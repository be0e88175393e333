//! Logout: revoke the cookie's token, optionally the whole account.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::error;

use crate::config::Config;
use crate::session::cookie::{clear_refresh_cookie, extract_refresh_token};
use crate::session::refresh;

async fn logout_inner(
    pool: &SqlitePool,
    config: &Config,
    headers: &HeaderMap,
    all_sessions: bool,
) -> Response {
    if let Some(presented) = extract_refresh_token(headers) {
        match refresh::revoke_presented(pool, &presented).await {
            Ok(Some(user_id)) if all_sessions => {
                if let Err(err) = refresh::revoke_all_for_user(pool, &user_id).await {
                    error!("failed to revoke all sessions: {err:#}");
                }
            }
            Ok(_) => {}
            Err(err) => {
                // Logout stays best-effort; the cookie is cleared regardless.
                error!("failed to revoke refresh token: {err:#}");
            }
        }
    }

    let mut response = (StatusCode::OK, Json(json!({"success": true}))).into_response();
    if let Ok(cookie) = clear_refresh_cookie(config) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    response
}

#[utoipa::path(
    post,
    path = "/api/logout",
    responses((status = 200, description = "Cookie token revoked and cookie cleared")),
    tag = "auth"
)]
pub async fn logout(
    Extension(pool): Extension<SqlitePool>,
    Extension(config): Extension<Arc<Config>>,
    headers: HeaderMap,
) -> Response {
    logout_inner(&pool, &config, &headers, false).await
}

#[utoipa::path(
    post,
    path = "/api/logout-all",
    responses((status = 200, description = "Every session for the user revoked")),
    tag = "auth"
)]
pub async fn logout_all(
    Extension(pool): Extension<SqlitePool>,
    Extension(config): Extension<Arc<Config>>,
    headers: HeaderMap,
) -> Response {
    logout_inner(&pool, &config, &headers, true).await
}
