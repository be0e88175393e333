//! Forgot-password and reset-password flows.

use axum::{
    extract::{Extension, Form},
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::register::{MIN_PASSWORD_LEN, normalize_email, valid_email};
use super::{error_redirect, internal_error, message_redirect};
use crate::api::email::{EmailSender, send_password_reset};
use crate::config::{Config, DEFAULT_RESET_TOKEN_TTL_SECONDS};
use crate::crypto::{generate_token_hex, hash_password, sha256_hex};
use crate::session::refresh;
use crate::store::{reset_tokens, users};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub redirect: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordForm {
    #[serde(default)]
    pub token: String,
    #[serde(default, rename = "newPassword")]
    pub new_password: String,
    #[serde(default, rename = "confirmPassword")]
    pub confirm_password: String,
    #[serde(default)]
    pub tenant: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/forgot-password",
    request_body(content = ForgotPasswordForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Always redirects to /login?message=reset_sent")
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    Extension(pool): Extension<SqlitePool>,
    Extension(config): Extension<Arc<Config>>,
    Extension(mailer): Extension<Arc<dyn EmailSender>>,
    Form(form): Form<ForgotPasswordForm>,
) -> Response {
    let email = normalize_email(&form.email);

    // The response is identical whether or not the account exists; only the
    // side effects differ.
    if valid_email(&email) {
        match users::find_by_email(&pool, &email).await {
            Ok(Some(user)) => {
                if let Err(err) = issue_reset_token(&pool, &config, mailer.as_ref(), &user.id, &email).await
                {
                    error!("failed to issue reset token: {err:#}");
                    return internal_error();
                }
            }
            Ok(None) => {}
            Err(err) => {
                error!("failed to lookup user for reset: {err:#}");
                return internal_error();
            }
        }
    }

    message_redirect("/login", "reset_sent")
}

async fn issue_reset_token(
    pool: &SqlitePool,
    config: &Config,
    mailer: &dyn EmailSender,
    user_id: &str,
    email: &str,
) -> anyhow::Result<()> {
    let token = generate_token_hex()?;
    let expires_at = Utc::now().timestamp() + DEFAULT_RESET_TOKEN_TTL_SECONDS;
    reset_tokens::insert(pool, &sha256_hex(&token), user_id, expires_at).await?;

    let reset_url = format!("{}/reset-password?token={token}", config.auth_domain());
    send_password_reset(mailer, config, email, &reset_url);
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/reset-password",
    request_body(content = ResetPasswordForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Redirect to /login?message=password_changed, or back to /reset-password with an error code")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    Extension(pool): Extension<SqlitePool>,
    Form(form): Form<ResetPasswordForm>,
) -> Response {
    if form.token.trim().is_empty() {
        return error_redirect("/reset-password", "invalid_token", &[]);
    }
    let echo: &[(&str, &str)] = &[("token", &form.token)];
    if form.new_password.len() < MIN_PASSWORD_LEN {
        return error_redirect("/reset-password", "password_weak", echo);
    }
    if form.new_password != form.confirm_password {
        return error_redirect("/reset-password", "password_mismatch", echo);
    }

    let now = Utc::now().timestamp();
    let consumed = match reset_tokens::consume(&pool, &sha256_hex(&form.token), now).await {
        Ok(consumed) => consumed,
        Err(err) => {
            error!("failed to consume reset token: {err:#}");
            return internal_error();
        }
    };
    let Some(reset) = consumed else {
        return error_redirect("/reset-password", "invalid_token", &[]);
    };
    if reset.expires_at <= now {
        return error_redirect("/reset-password", "token_expired", &[]);
    }

    let hash = match hash_password(&form.new_password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("password hashing failed: {err:#}");
            return internal_error();
        }
    };
    if let Err(err) = users::set_password_hash(&pool, &reset.user_id, &hash).await {
        error!("failed to update password: {err:#}");
        return internal_error();
    }

    // A changed password invalidates every open session for the user.
    if let Err(err) = refresh::revoke_all_for_user(&pool, &reset.user_id).await {
        error!("failed to revoke sessions after reset: {err:#}");
        return internal_error();
    }

    message_redirect("/login", "password_changed")
}
