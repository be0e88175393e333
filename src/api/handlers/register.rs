//! Registration: redirect-first validation, then user creation.

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

use super::{AuthCompletion, complete_authentication, error_redirect, internal_error};
use crate::api::email::{EmailSender, send_welcome};
use crate::config::Config;
use crate::crypto::hash_password;
use crate::jwt::Audience;
use crate::redirect::{TenantDirectory, validate_redirect};
use crate::store::users::{self, InsertOutcome, NewUser};

pub(crate) const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "confirmPassword")]
    pub confirm_password: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub redirect: String,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub code_challenge: Option<String>,
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic `local@domain.tld` shape check on already-normalized input.
pub(crate) fn valid_email(email: &str) -> bool {
    regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .is_ok_and(|pattern| pattern.is_match(email))
}

#[utoipa::path(
    post,
    path = "/api/register",
    request_body(content = RegisterForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Redirect to the tenant callback, or back to /register with an error code")
    ),
    tag = "auth"
)]
pub async fn register(
    Extension(pool): Extension<SqlitePool>,
    Extension(config): Extension<Arc<Config>>,
    Extension(directory): Extension<Arc<dyn TenantDirectory>>,
    Extension(mailer): Extension<Arc<dyn EmailSender>>,
    headers: HeaderMap,
    Form(form): Form<RegisterForm>,
) -> Response {
    let email = normalize_email(&form.email);
    let echo: &[(&str, &str)] = &[
        ("email", &email),
        ("name", &form.name),
        ("redirect", &form.redirect),
    ];

    // Redirect validation runs before anything else touches the input.
    let Ok(validated) =
        validate_redirect(&form.redirect, config.environment(), directory.as_ref()).await
    else {
        return error_redirect("/register", "invalid_redirect", echo);
    };

    if !valid_email(&email) {
        return error_redirect("/register", "invalid_email", echo);
    }
    if form.password.len() < MIN_PASSWORD_LEN {
        return error_redirect("/register", "password_weak", echo);
    }
    if form.password != form.confirm_password {
        return error_redirect("/register", "password_mismatch", echo);
    }

    let name = if form.name.trim().is_empty() {
        email.split('@').next().unwrap_or(&email).to_string()
    } else {
        form.name.trim().to_string()
    };

    let password_hash = match hash_password(&form.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("password hashing failed: {err:#}");
            return internal_error();
        }
    };

    let outcome = users::insert(
        &pool,
        &NewUser {
            email: &email,
            email_verified: false,
            password_hash: Some(&password_hash),
            name: &name,
            avatar_url: None,
        },
    )
    .await;

    let user = match outcome {
        Ok(InsertOutcome::Created(user)) => user,
        Ok(InsertOutcome::EmailExists) => {
            return error_redirect("/register", "email_exists", echo);
        }
        Err(err) => {
            error!("failed to create user: {err:#}");
            return internal_error();
        }
    };

    send_welcome(mailer.as_ref(), &config, &user.email, &user.name);

    let completion = AuthCompletion {
        user: &user,
        validated: &validated,
        audience: Audience::parse(form.audience.as_deref()),
        code_challenge: form.code_challenge.as_deref(),
    };
    match complete_authentication(&pool, &config, &headers, completion).await {
        Ok(response) => response,
        Err(err) => {
            error!("failed to complete registration: {err:#}");
            internal_error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization_and_shape() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
        assert!(valid_email("alice@example.com"));
        assert!(valid_email("a.b+c@sub.example.co"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing@tld"));
        assert!(!valid_email("spaces in@example.com"));
        assert!(!valid_email("@example.com"));
    }
}
