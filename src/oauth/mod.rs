//! OAuth 2.0 / OIDC federation.
//!
//! A provider-agnostic state machine with four adapters. Initiation pins the
//! round-trip in a single-use state row; the callback consumes it, exchanges
//! the code, normalizes the provider profile, and resolves it to a platform
//! user.

pub mod apple;
pub mod profile;
pub mod providers;
pub mod resolve;

use anyhow::Context;
use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::warn;

use crate::config::{Config, DEFAULT_OAUTH_STATE_TTL_SECONDS};
use crate::crypto::{generate_token_base64url, generate_token_hex, pkce_challenge_s256};
use crate::store::oauth_states::{self, FederationState, NewFederationState};
use crate::store::users::User;

pub use profile::FederatedProfile;

/// The supported identity providers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    Google,
    Facebook,
    Apple,
    Microsoft,
}

impl Provider {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "google" => Some(Self::Google),
            "facebook" => Some(Self::Facebook),
            "apple" => Some(Self::Apple),
            "microsoft" => Some(Self::Microsoft),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
            Self::Apple => "apple",
            Self::Microsoft => "microsoft",
        }
    }

    /// OIDC providers return an ID token and get a nonce pinned in state.
    #[must_use]
    pub const fn supports_oidc(self) -> bool {
        !matches!(self, Self::Facebook)
    }
}

/// Federation failures. Handlers collapse everything except `NotConfigured`
/// into the generic `oauth_failed` code.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("provider not configured")]
    NotConfigured,
    #[error("invalid, expired, or mismatched state")]
    InvalidState,
    #[error("provider reported an error: {0}")]
    Provider(String),
    #[error("code exchange failed: {0}")]
    Exchange(String),
    #[error("id token rejected: {0}")]
    IdToken(String),
    #[error("profile incomplete: {0}")]
    Profile(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Begin a federation round-trip: pin state, return the provider URL to 302 to.
pub async fn begin(
    pool: &SqlitePool,
    config: &Config,
    provider: Provider,
    tenant_id: &str,
    redirect_url: &str,
) -> Result<String, OAuthError> {
    let state = generate_token_hex().context("failed to generate state")?;
    let code_verifier = generate_token_base64url().context("failed to generate verifier")?;
    let code_challenge = pkce_challenge_s256(&code_verifier);
    let nonce = if provider.supports_oidc() {
        Some(generate_token_hex().context("failed to generate nonce")?)
    } else {
        None
    };
    let now = Utc::now().timestamp();

    let callback_url = config.oauth_callback_url(provider.as_str());
    let authorization_url = providers::authorization_url(
        provider,
        config.oauth(),
        &providers::AuthorizationRequest {
            state: &state,
            code_challenge: &code_challenge,
            nonce: nonce.as_deref(),
            callback_url: &callback_url,
        },
    )?;

    oauth_states::insert(
        pool,
        &NewFederationState {
            state: &state,
            tenant_id,
            redirect_url,
            code_verifier: &code_verifier,
            nonce: nonce.as_deref(),
            provider: provider.as_str(),
            expires_at: now + DEFAULT_OAUTH_STATE_TTL_SECONDS,
        },
    )
    .await?;

    // Opportunistic storage reclamation; never affects the redirect.
    if let Err(err) = oauth_states::sweep_expired(pool, now).await {
        warn!("federation state sweep failed: {err:#}");
    }

    Ok(authorization_url)
}

/// What the callback hands back to the HTTP layer.
#[derive(Debug)]
pub struct CallbackOutcome {
    pub user: User,
    pub state: FederationState,
}

/// Complete a federation round-trip after the provider redirected back.
pub async fn complete(
    pool: &SqlitePool,
    config: &Config,
    http: &reqwest::Client,
    provider: Provider,
    code: &str,
    state_value: &str,
    apple_user_blob: Option<&str>,
) -> Result<CallbackOutcome, OAuthError> {
    let state = oauth_states::consume(pool, state_value)
        .await?
        .ok_or(OAuthError::InvalidState)?;
    if state.expires_at <= Utc::now().timestamp() || state.provider != provider.as_str() {
        return Err(OAuthError::InvalidState);
    }

    let callback_url = config.oauth_callback_url(provider.as_str());
    let tokens = providers::exchange_code(
        http,
        provider,
        config.oauth(),
        code,
        &state.code_verifier,
        &callback_url,
    )
    .await?;

    let profile = profile::from_provider_response(
        http,
        provider,
        config.oauth(),
        &tokens,
        state.nonce.as_deref(),
        apple_user_blob,
    )
    .await?;

    let user = resolve::resolve_user(pool, &profile).await?;

    Ok(CallbackOutcome { user, state })
}
