//! Request handlers and the helpers they share.

pub mod health;
pub mod jwks;
pub mod login;
pub mod logout;
pub mod memberships;
pub mod oauth;
pub mod pages;
pub mod password;
pub mod refresh;
pub mod register;
pub mod token;

use anyhow::Result;
use axum::{
    Json,
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::jwt::Audience;
use crate::redirect::ValidatedRedirect;
use crate::session::{ClientMeta, codes, cookie, refresh as refresh_tokens};
use crate::store::memberships as membership_store;
use crate::store::users::User;

/// Extract a client IP from common proxy headers.
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

/// 302 with a Location header; the flows in this service redirect with
/// FOUND, never SEE OTHER.
pub(crate) fn found(location: &str) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

/// Redirect back to an HTML page with an error code and echoed fields.
pub(crate) fn error_redirect(page: &str, code: &str, echo: &[(&str, &str)]) -> Response {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("error", code);
    for (key, value) in echo {
        if !value.is_empty() {
            serializer.append_pair(key, value);
        }
    }
    found(&format!("{page}?{}", serializer.finish()))
}

/// Redirect to a page with a success message.
pub(crate) fn message_redirect(page: &str, message: &str) -> Response {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("message", message);
    found(&format!("{page}?{}", serializer.finish()))
}

pub(crate) fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Internal server error"})),
    )
        .into_response()
}

/// Everything needed to finish a successful authentication.
pub(crate) struct AuthCompletion<'a> {
    pub user: &'a User,
    pub validated: &'a ValidatedRedirect,
    pub audience: Audience,
    pub code_challenge: Option<&'a str>,
}

/// Shared tail of register, login, and the federation callback: membership,
/// refresh token, authorization code, 302 to the tenant callback.
pub(crate) async fn complete_authentication(
    pool: &SqlitePool,
    config: &Config,
    headers: &HeaderMap,
    completion: AuthCompletion<'_>,
) -> Result<Response> {
    membership_store::ensure_membership(pool, &completion.user.id, &completion.validated.tenant_id)
        .await?;

    let ip = client_ip(headers);
    let agent = user_agent(headers);
    let issued = refresh_tokens::issue(
        pool,
        &completion.user.id,
        config.refresh_token_ttl_seconds(),
        ClientMeta {
            ip: ip.as_deref(),
            user_agent: agent.as_deref(),
        },
    )
    .await?;

    let code = codes::mint(
        pool,
        &codes::MintCode {
            user_id: &completion.user.id,
            tenant_id: &completion.validated.tenant_id,
            redirect_origin: &completion.validated.origin,
            audience: completion.audience.as_str(),
            code_challenge: completion.code_challenge,
            ttl_seconds: config.auth_code_ttl_seconds(),
        },
    )
    .await?;

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("code", &code)
        .append_pair("returnTo", &completion.validated.return_to)
        .finish();
    let location = format!("{}/auth/callback?{query}", completion.validated.origin);

    let mut response = found(&location);
    let cookie = cookie::refresh_cookie(config, &issued.token)?;
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}
