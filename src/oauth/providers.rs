//! Provider endpoints, authorization URL construction, and code exchange.

use secrecy::ExposeSecret;
use serde::Deserialize;
use url::Url;

use super::{OAuthError, Provider, apple};
use crate::config::OAuthProviders;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const FACEBOOK_AUTH_URL: &str = "https://www.facebook.com/v18.0/dialog/oauth";
const FACEBOOK_TOKEN_URL: &str = "https://graph.facebook.com/v18.0/oauth/access_token";
const APPLE_AUTH_URL: &str = "https://appleid.apple.com/auth/authorize";
const APPLE_TOKEN_URL: &str = "https://appleid.apple.com/auth/token";
const MICROSOFT_AUTH_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";

#[derive(Debug)]
pub struct AuthorizationRequest<'a> {
    pub state: &'a str,
    pub code_challenge: &'a str,
    pub nonce: Option<&'a str>,
    pub callback_url: &'a str,
}

/// What a provider token endpoint returns. Facebook has no ID token; the
/// profile comes from the Graph API with the access token.
#[derive(Debug, Deserialize)]
pub struct ProviderTokens {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
}

const fn scopes(provider: Provider) -> &'static str {
    match provider {
        Provider::Google => "openid email profile",
        Provider::Facebook => "email,public_profile",
        Provider::Apple => "name email",
        Provider::Microsoft => "openid email profile",
    }
}

fn client_id<'a>(provider: Provider, oauth: &'a OAuthProviders) -> Result<&'a str, OAuthError> {
    match provider {
        Provider::Google => oauth.google.as_ref().map(|c| c.client_id.as_str()),
        Provider::Facebook => oauth.facebook.as_ref().map(|c| c.client_id.as_str()),
        Provider::Apple => oauth.apple.as_ref().map(|c| c.client_id.as_str()),
        Provider::Microsoft => oauth.microsoft.as_ref().map(|c| c.client_id.as_str()),
    }
    .ok_or(OAuthError::NotConfigured)
}

/// Whether credentials exist for this provider.
#[must_use]
pub fn is_configured(provider: Provider, oauth: &OAuthProviders) -> bool {
    client_id(provider, oauth).is_ok()
}

/// Build the provider authorization URL for a pinned round-trip.
pub fn authorization_url(
    provider: Provider,
    oauth: &OAuthProviders,
    request: &AuthorizationRequest<'_>,
) -> Result<String, OAuthError> {
    let client_id = client_id(provider, oauth)?;
    let base = match provider {
        Provider::Google => GOOGLE_AUTH_URL,
        Provider::Facebook => FACEBOOK_AUTH_URL,
        Provider::Apple => APPLE_AUTH_URL,
        Provider::Microsoft => MICROSOFT_AUTH_URL,
    };

    let mut url = Url::parse(base).map_err(|err| OAuthError::Internal(err.into()))?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", request.callback_url)
            .append_pair("response_type", "code")
            .append_pair("scope", scopes(provider))
            .append_pair("state", request.state);

        if provider.supports_oidc() {
            query
                .append_pair("code_challenge", request.code_challenge)
                .append_pair("code_challenge_method", "S256");
        }
        if let Some(nonce) = request.nonce {
            query.append_pair("nonce", nonce);
        }
        if provider == Provider::Apple {
            // Apple requires form_post whenever name or email scopes are asked.
            query.append_pair("response_mode", "form_post");
        }
    }

    Ok(url.into())
}

fn token_url<'a>(provider: Provider, oauth: &'a OAuthProviders) -> Result<&'a str, OAuthError> {
    let configured = match provider {
        Provider::Google => oauth.google.as_ref().and_then(|c| c.token_url.as_deref()),
        Provider::Facebook => oauth.facebook.as_ref().and_then(|c| c.token_url.as_deref()),
        Provider::Apple => oauth.apple.as_ref().and_then(|c| c.token_url.as_deref()),
        Provider::Microsoft => oauth.microsoft.as_ref().and_then(|c| c.token_url.as_deref()),
    };
    Ok(configured.unwrap_or(match provider {
        Provider::Google => GOOGLE_TOKEN_URL,
        Provider::Facebook => FACEBOOK_TOKEN_URL,
        Provider::Apple => APPLE_TOKEN_URL,
        Provider::Microsoft => MICROSOFT_TOKEN_URL,
    }))
}

fn client_secret(provider: Provider, oauth: &OAuthProviders) -> Result<String, OAuthError> {
    match provider {
        Provider::Google => oauth
            .google
            .as_ref()
            .map(|c| c.client_secret.expose_secret().to_string())
            .ok_or(OAuthError::NotConfigured),
        Provider::Facebook => oauth
            .facebook
            .as_ref()
            .map(|c| c.client_secret.expose_secret().to_string())
            .ok_or(OAuthError::NotConfigured),
        Provider::Microsoft => oauth
            .microsoft
            .as_ref()
            .map(|c| c.client_secret.expose_secret().to_string())
            .ok_or(OAuthError::NotConfigured),
        // Apple secrets are ES256 JWTs minted per exchange.
        Provider::Apple => {
            let apple = oauth.apple.as_ref().ok_or(OAuthError::NotConfigured)?;
            apple::client_secret(apple).map_err(OAuthError::Internal)
        }
    }
}

/// Exchange an authorization code at the provider token endpoint.
pub async fn exchange_code(
    http: &reqwest::Client,
    provider: Provider,
    oauth: &OAuthProviders,
    code: &str,
    code_verifier: &str,
    callback_url: &str,
) -> Result<ProviderTokens, OAuthError> {
    let client_id = client_id(provider, oauth)?.to_string();
    let secret = client_secret(provider, oauth)?;
    let url = token_url(provider, oauth)?;

    let mut form = vec![
        ("grant_type", "authorization_code".to_string()),
        ("code", code.to_string()),
        ("redirect_uri", callback_url.to_string()),
        ("client_id", client_id),
        ("client_secret", secret),
    ];
    if provider.supports_oidc() {
        form.push(("code_verifier", code_verifier.to_string()));
    }

    let response = http
        .post(url)
        .form(&form)
        .send()
        .await
        .map_err(|err| OAuthError::Exchange(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(OAuthError::Exchange(format!(
            "token endpoint returned {status}"
        )));
    }

    response
        .json::<ProviderTokens>()
        .await
        .map_err(|err| OAuthError::Exchange(err.to_string()))
}
