//! Server-to-server code exchange.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode, header::CACHE_CONTROL},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::internal_error;
use crate::config::Config;
use crate::jwt::{AdminContext, Audience, JwtKeys, TokenSubject, sign_access_token};
use crate::session::codes::{self, ExchangeError, ExchangeRequest};
use crate::store::{memberships, users};

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub code: String,
    pub tenant_id: String,
    pub redirect_origin: String,
    #[serde(default)]
    pub code_verifier: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

// Exchange rejections collapse into two messages so callers cannot probe
// which binding failed.
fn rejection_message(err: &ExchangeError) -> &'static str {
    match err {
        ExchangeError::UnknownCode | ExchangeError::Expired => {
            "Invalid or expired authorization code"
        }
        ExchangeError::TenantMismatch | ExchangeError::OriginMismatch | ExchangeError::PkceMismatch => {
            "Authorization code mismatch"
        }
        ExchangeError::Store(_) => "Internal server error",
    }
}

#[utoipa::path(
    post,
    path = "/api/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Signed access token", body = TokenResponse),
        (status = 400, description = "Code rejected")
    ),
    tag = "auth"
)]
pub async fn token(
    Extension(pool): Extension<SqlitePool>,
    Extension(config): Extension<Arc<Config>>,
    Extension(keys): Extension<Arc<JwtKeys>>,
    Json(request): Json<TokenRequest>,
) -> Response {
    let exchange = ExchangeRequest {
        code: &request.code,
        tenant_id: &request.tenant_id,
        redirect_origin: &request.redirect_origin,
        code_verifier: request.code_verifier.as_deref(),
    };
    let stored = match codes::exchange(&pool, &exchange).await {
        Ok(stored) => stored,
        Err(ExchangeError::Store(err)) => {
            error!("code exchange failed: {err:#}");
            return internal_error();
        }
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": rejection_message(&err)})),
            )
                .into_response();
        }
    };

    let user = match users::find_by_id(&pool, &stored.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            // The code outlived its user; treat like any other dead code.
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Invalid or expired authorization code"})),
            )
                .into_response();
        }
        Err(err) => {
            error!("failed to load user for exchange: {err:#}");
            return internal_error();
        }
    };

    let audience = Audience::parse(Some(stored.audience.as_str()));
    let admin = if audience == Audience::Admin {
        match memberships::primary_admin_context(&pool, &user.id).await {
            Ok(context) => Some(context.map_or_else(AdminContext::default, |(tenant, roles)| {
                AdminContext {
                    primary_tenant_id: Some(tenant),
                    roles,
                }
            })),
            Err(err) => {
                error!("failed to load admin context: {err:#}");
                return internal_error();
            }
        }
    } else {
        None
    };

    let subject = TokenSubject {
        user_id: &user.id,
        email: &user.email,
        name: &user.name,
    };
    let access_token = match sign_access_token(
        &keys,
        config.auth_domain(),
        config.access_token_ttl_seconds(),
        subject,
        audience,
        admin,
    ) {
        Ok(token) => token,
        Err(err) => {
            error!("failed to sign access token: {err:#}");
            return internal_error();
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    (
        StatusCode::OK,
        headers,
        Json(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: config.access_token_ttl_seconds(),
        }),
    )
        .into_response()
}
