//! Federation initiation and callback endpoints.

use axum::{
    extract::{Extension, Form, Path, Query},
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, warn};

use super::{AuthCompletion, complete_authentication, error_redirect, found};
use crate::config::Config;
use crate::jwt::Audience;
use crate::oauth::{self, OAuthError, Provider, providers};
use crate::redirect::{TenantDirectory, validate_redirect};

#[derive(Debug, Deserialize)]
pub struct InitParams {
    #[serde(default)]
    pub redirect: String,
    #[serde(default)]
    pub tenant: Option<String>,
}

/// Query fields of a GET callback; Apple posts the same shape as a form.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
}

fn oauth_failed() -> Response {
    error_redirect("/login", "oauth_failed", &[])
}

pub async fn init(
    Extension(pool): Extension<SqlitePool>,
    Extension(config): Extension<Arc<Config>>,
    Extension(directory): Extension<Arc<dyn TenantDirectory>>,
    Path(provider): Path<String>,
    Query(params): Query<InitParams>,
) -> Response {
    let Some(provider) = Provider::parse(&provider) else {
        return oauth_failed();
    };
    if !providers::is_configured(provider, config.oauth()) {
        return error_redirect("/login", "oauth_not_configured", &[]);
    }

    let Ok(validated) =
        validate_redirect(&params.redirect, config.environment(), directory.as_ref()).await
    else {
        return error_redirect("/login", "invalid_redirect", &[]);
    };

    match oauth::begin(
        &pool,
        &config,
        provider,
        &validated.tenant_id,
        &params.redirect,
    )
    .await
    {
        Ok(authorization_url) => found(&authorization_url),
        Err(err) => {
            error!(provider = provider.as_str(), "oauth init failed: {err:#}");
            oauth_failed()
        }
    }
}

pub async fn callback_get(
    pool: Extension<SqlitePool>,
    config: Extension<Arc<Config>>,
    directory: Extension<Arc<dyn TenantDirectory>>,
    http: Extension<reqwest::Client>,
    provider: Path<String>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    callback(pool, config, directory, http, provider, headers, params).await
}

/// Apple returns the callback as a form POST (`response_mode=form_post`).
pub async fn callback_post(
    pool: Extension<SqlitePool>,
    config: Extension<Arc<Config>>,
    directory: Extension<Arc<dyn TenantDirectory>>,
    http: Extension<reqwest::Client>,
    provider: Path<String>,
    headers: HeaderMap,
    Form(params): Form<CallbackParams>,
) -> Response {
    callback(pool, config, directory, http, provider, headers, params).await
}

async fn callback(
    Extension(pool): Extension<SqlitePool>,
    Extension(config): Extension<Arc<Config>>,
    Extension(directory): Extension<Arc<dyn TenantDirectory>>,
    Extension(http): Extension<reqwest::Client>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    params: CallbackParams,
) -> Response {
    let Some(provider) = Provider::parse(&provider) else {
        return oauth_failed();
    };

    if let Some(provider_error) = params.error {
        warn!(
            provider = provider.as_str(),
            error = %provider_error,
            description = params.error_description.as_deref().unwrap_or_default(),
            "provider returned an error"
        );
        return oauth_failed();
    }
    let (Some(code), Some(state)) = (params.code, params.state) else {
        return oauth_failed();
    };

    let outcome = match oauth::complete(
        &pool,
        &config,
        &http,
        provider,
        &code,
        &state,
        params.user.as_deref(),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(OAuthError::NotConfigured) => {
            return error_redirect("/login", "oauth_not_configured", &[]);
        }
        Err(err) => {
            warn!(provider = provider.as_str(), "oauth callback failed: {err:#}");
            return oauth_failed();
        }
    };

    // The redirect URL was validated at initiation; re-validating re-derives
    // the origin and keeps a directory change from widening it since. The
    // tenant stays the one pinned in the state row.
    let Ok(mut validated) = validate_redirect(
        &outcome.state.redirect_url,
        config.environment(),
        directory.as_ref(),
    )
    .await
    else {
        return error_redirect("/login", "invalid_redirect", &[]);
    };
    validated.tenant_id = outcome.state.tenant_id.clone();

    let completion = AuthCompletion {
        user: &outcome.user,
        validated: &validated,
        audience: Audience::Storefront,
        code_challenge: None,
    };
    match complete_authentication(&pool, &config, &headers, completion).await {
        Ok(response) => response,
        Err(err) => {
            error!("failed to complete federated sign-in: {err:#}");
            oauth_failed()
        }
    }
}
