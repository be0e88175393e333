//! Password login with account-enumeration defenses.

use axum::{
    extract::{Extension, Form},
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::register::normalize_email;
use super::{AuthCompletion, complete_authentication, error_redirect, internal_error};
use crate::config::Config;
use crate::crypto::password::{equalize_verification_cost, verify_password};
use crate::jwt::Audience;
use crate::redirect::{TenantDirectory, validate_redirect};
use crate::store::users;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub redirect: String,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub code_challenge: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/login",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Redirect to the tenant callback, or back to /login with an error code")
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(pool): Extension<SqlitePool>,
    Extension(config): Extension<Arc<Config>>,
    Extension(directory): Extension<Arc<dyn TenantDirectory>>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let email = normalize_email(&form.email);
    let echo: &[(&str, &str)] = &[("email", &email), ("redirect", &form.redirect)];

    let Ok(validated) =
        validate_redirect(&form.redirect, config.environment(), directory.as_ref()).await
    else {
        return error_redirect("/login", "invalid_redirect", echo);
    };

    let user = match users::find_by_email(&pool, &email).await {
        Ok(user) => user,
        Err(err) => {
            error!("failed to lookup user: {err:#}");
            return internal_error();
        }
    };

    // Unknown accounts and federated-only accounts burn the same PBKDF2 cost
    // as a real verification, then fail with the same generic code.
    let user = match user {
        Some(user) if user.password_hash.is_some() => user,
        _ => {
            equalize_verification_cost(&form.password);
            return error_redirect("/login", "invalid_credentials", echo);
        }
    };

    let stored_hash = user.password_hash.as_deref().unwrap_or_default();
    if !verify_password(&form.password, stored_hash) {
        return error_redirect("/login", "invalid_credentials", echo);
    }

    let completion = AuthCompletion {
        user: &user,
        validated: &validated,
        audience: Audience::parse(form.audience.as_deref()),
        code_challenge: form.code_challenge.as_deref(),
    };
    match complete_authentication(&pool, &config, &headers, completion).await {
        Ok(response) => response,
        Err(err) => {
            error!("failed to complete login: {err:#}");
            internal_error()
        }
    }
}
