//! Top-level-navigation refresh: rotate the cookie, mint a code, bounce back.

use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, header::SET_COOKIE},
    response::Response,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::error;
use utoipa::IntoParams;

use super::{client_ip, error_redirect, found, internal_error, user_agent};
use crate::config::Config;
use crate::jwt::Audience;
use crate::redirect::{TenantDirectory, validate_redirect};
use crate::session::cookie::{clear_refresh_cookie, extract_refresh_token, refresh_cookie};
use crate::session::{ClientMeta, codes, refresh};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RefreshParams {
    #[serde(default)]
    pub redirect: String,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
}

fn session_expired(config: &Config) -> Response {
    let mut response = error_redirect("/login", "session_expired", &[]);
    if let Ok(cookie) = clear_refresh_cookie(config) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    response
}

#[utoipa::path(
    get,
    path = "/api/refresh",
    params(RefreshParams),
    responses(
        (status = 302, description = "Redirect to the tenant callback with a rotated cookie, or to /login?error=session_expired")
    ),
    tag = "auth"
)]
pub async fn refresh(
    Extension(pool): Extension<SqlitePool>,
    Extension(config): Extension<Arc<Config>>,
    Extension(directory): Extension<Arc<dyn TenantDirectory>>,
    headers: HeaderMap,
    Query(params): Query<RefreshParams>,
) -> Response {
    let Ok(validated) =
        validate_redirect(&params.redirect, config.environment(), directory.as_ref()).await
    else {
        return error_redirect("/login", "invalid_redirect", &[]);
    };

    let Some(presented) = extract_refresh_token(&headers) else {
        return session_expired(&config);
    };

    let ip = client_ip(&headers);
    let agent = user_agent(&headers);
    let rotated = match refresh::rotate(
        &pool,
        &presented,
        config.refresh_token_ttl_seconds(),
        ClientMeta {
            ip: ip.as_deref(),
            user_agent: agent.as_deref(),
        },
    )
    .await
    {
        Ok(rotated) => rotated,
        Err(refresh::RefreshError::Store(err)) => {
            error!("refresh rotation failed: {err:#}");
            return internal_error();
        }
        Err(_) => return session_expired(&config),
    };

    let code = match codes::mint(
        &pool,
        &codes::MintCode {
            user_id: &rotated.user_id,
            tenant_id: &validated.tenant_id,
            redirect_origin: &validated.origin,
            audience: Audience::parse(params.audience.as_deref()).as_str(),
            code_challenge: None,
            ttl_seconds: config.auth_code_ttl_seconds(),
        },
    )
    .await
    {
        Ok(code) => code,
        Err(err) => {
            error!("failed to mint code after refresh: {err:#}");
            return internal_error();
        }
    };

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("code", &code)
        .append_pair("returnTo", &validated.return_to)
        .finish();
    let mut response = found(&format!("{}/auth/callback?{query}", validated.origin));
    match refresh_cookie(&config, &rotated.token) {
        Ok(cookie) => {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("failed to build refresh cookie: {err}");
            return internal_error();
        }
    }
    response
}
