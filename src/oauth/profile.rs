//! Provider responses normalized into one profile shape.
//!
//! ID tokens arrive straight from the provider token endpoint over TLS, so
//! claims are validated (issuer, audience, expiry, nonce) but the signature
//! is not re-checked; that is the standard posture for confidential clients.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::providers::ProviderTokens;
use super::{OAuthError, Provider, apple};
use crate::config::OAuthProviders;

const FACEBOOK_PROFILE_URL: &str =
    "https://graph.facebook.com/v18.0/me?fields=id,name,email,picture";

/// Normalized identity returned by every adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedProfile {
    pub provider: String,
    pub provider_account_id: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Turn a provider token response into a normalized profile.
pub async fn from_provider_response(
    http: &reqwest::Client,
    provider: Provider,
    oauth: &OAuthProviders,
    tokens: &ProviderTokens,
    expected_nonce: Option<&str>,
    apple_user_blob: Option<&str>,
) -> Result<FederatedProfile, OAuthError> {
    match provider {
        Provider::Facebook => {
            let access_token = tokens
                .access_token
                .as_deref()
                .ok_or_else(|| OAuthError::Exchange("missing access token".to_string()))?;
            facebook_profile(http, oauth, access_token).await
        }
        Provider::Google | Provider::Apple | Provider::Microsoft => {
            let id_token = tokens
                .id_token
                .as_deref()
                .ok_or_else(|| OAuthError::Exchange("missing id token".to_string()))?;
            let claims = decode_id_token_payload(id_token)?;
            validate_id_token(provider, oauth, &claims, expected_nonce)?;
            profile_from_claims(provider, &claims, apple_user_blob)
        }
    }
}

fn decode_id_token_payload(id_token: &str) -> Result<Value, OAuthError> {
    let mut parts = id_token.split('.');
    let _header = parts.next();
    let payload = parts
        .next()
        .ok_or_else(|| OAuthError::IdToken("not a compact jws".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| OAuthError::IdToken("payload is not base64url".to_string()))?;
    serde_json::from_slice(&bytes).map_err(|_| OAuthError::IdToken("payload is not json".to_string()))
}

fn microsoft_issuer_matches(issuer: &str) -> bool {
    // Tenant-specific issuers; the directory id varies per account.
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^https://login\.microsoftonline\.com/[0-9a-fA-F-]+/v2\.0$").ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(issuer))
}

fn validate_id_token(
    provider: Provider,
    oauth: &OAuthProviders,
    claims: &Value,
    expected_nonce: Option<&str>,
) -> Result<(), OAuthError> {
    let issuer = claims
        .get("iss")
        .and_then(Value::as_str)
        .ok_or_else(|| OAuthError::IdToken("missing iss".to_string()))?;
    let issuer_ok = match provider {
        Provider::Google => issuer == "https://accounts.google.com" || issuer == "accounts.google.com",
        Provider::Apple => issuer == "https://appleid.apple.com",
        Provider::Microsoft => microsoft_issuer_matches(issuer),
        Provider::Facebook => false,
    };
    if !issuer_ok {
        return Err(OAuthError::IdToken(format!("unexpected issuer {issuer}")));
    }

    let client_id = match provider {
        Provider::Google => oauth.google.as_ref().map(|c| c.client_id.as_str()),
        Provider::Apple => oauth.apple.as_ref().map(|c| c.client_id.as_str()),
        Provider::Microsoft => oauth.microsoft.as_ref().map(|c| c.client_id.as_str()),
        Provider::Facebook => None,
    }
    .ok_or(OAuthError::NotConfigured)?;

    let audience_ok = match claims.get("aud") {
        Some(Value::String(aud)) => aud == client_id,
        Some(Value::Array(auds)) => auds.iter().any(|aud| aud.as_str() == Some(client_id)),
        _ => false,
    };
    if !audience_ok {
        return Err(OAuthError::IdToken("audience mismatch".to_string()));
    }

    let exp = claims
        .get("exp")
        .and_then(Value::as_i64)
        .ok_or_else(|| OAuthError::IdToken("missing exp".to_string()))?;
    if exp <= Utc::now().timestamp() {
        return Err(OAuthError::IdToken("token expired".to_string()));
    }

    if let Some(expected) = expected_nonce {
        let nonce = claims.get("nonce").and_then(Value::as_str);
        if nonce != Some(expected) {
            return Err(OAuthError::IdToken("nonce mismatch".to_string()));
        }
    }

    Ok(())
}

fn claim_str(claims: &Value, name: &str) -> Option<String> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

// Apple serializes email_verified as the string "true" in some responses.
fn claim_bool(claims: &Value, name: &str) -> Option<bool> {
    match claims.get(name) {
        Some(Value::Bool(value)) => Some(*value),
        Some(Value::String(value)) => Some(value == "true"),
        _ => None,
    }
}

fn profile_from_claims(
    provider: Provider,
    claims: &Value,
    apple_user_blob: Option<&str>,
) -> Result<FederatedProfile, OAuthError> {
    let provider_account_id = claim_str(claims, "sub")
        .ok_or_else(|| OAuthError::Profile("missing subject".to_string()))?;
    let email = claim_str(claims, "email")
        .or_else(|| {
            // Microsoft work accounts surface the address here instead.
            if provider == Provider::Microsoft {
                claim_str(claims, "preferred_username").filter(|value| value.contains('@'))
            } else {
                None
            }
        })
        .ok_or_else(|| OAuthError::Profile("provider returned no email".to_string()))?;

    let email_verified = match provider {
        Provider::Google | Provider::Apple => claim_bool(claims, "email_verified").unwrap_or(false),
        // Microsoft does not emit the claim for most tenants; directory
        // accounts are treated as verified unless it says otherwise.
        Provider::Microsoft => claim_bool(claims, "email_verified").unwrap_or(true),
        Provider::Facebook => false,
    };

    let name = match provider {
        Provider::Apple => apple_user_blob.and_then(apple::name_from_user_blob),
        _ => claim_str(claims, "name"),
    };
    let avatar_url = claim_str(claims, "picture");

    Ok(FederatedProfile {
        provider: provider.as_str().to_string(),
        provider_account_id,
        email: email.trim().to_lowercase(),
        email_verified,
        name,
        avatar_url,
    })
}

/// Facebook has no ID token; the Graph API provides the profile.
async fn facebook_profile(
    http: &reqwest::Client,
    oauth: &OAuthProviders,
    access_token: &str,
) -> Result<FederatedProfile, OAuthError> {
    let url = oauth
        .facebook
        .as_ref()
        .and_then(|c| c.profile_url.as_deref())
        .unwrap_or(FACEBOOK_PROFILE_URL);

    let response = http
        .get(url)
        .query(&[("access_token", access_token)])
        .send()
        .await
        .map_err(|err| OAuthError::Profile(err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(OAuthError::Profile(format!(
            "profile endpoint returned {status}"
        )));
    }
    let body: Value = response
        .json()
        .await
        .map_err(|err| OAuthError::Profile(err.to_string()))?;

    let provider_account_id = claim_str(&body, "id")
        .ok_or_else(|| OAuthError::Profile("missing account id".to_string()))?;
    let email = claim_str(&body, "email")
        .ok_or_else(|| OAuthError::Profile("provider returned no email".to_string()))?;
    let avatar_url = body
        .get("picture")
        .and_then(|picture| picture.get("data"))
        .and_then(|data| data.get("url"))
        .and_then(Value::as_str)
        .map(ToString::to_string);

    Ok(FederatedProfile {
        provider: Provider::Facebook.as_str().to_string(),
        provider_account_id,
        email: email.trim().to_lowercase(),
        // Graph API only returns addresses Facebook itself confirmed; treated
        // as verified, which is a policy choice rather than a guarantee.
        email_verified: true,
        name: claim_str(&body, "name"),
        avatar_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthClientConfig;
    use secrecy::SecretString;
    use serde_json::json;

    fn oauth() -> OAuthProviders {
        OAuthProviders {
            google: Some(OAuthClientConfig::new(
                "google-client".to_string(),
                SecretString::from("secret".to_string()),
            )),
            facebook: None,
            apple: None,
            microsoft: Some(OAuthClientConfig::new(
                "ms-client".to_string(),
                SecretString::from("secret".to_string()),
            )),
        }
    }

    fn google_claims() -> Value {
        json!({
            "iss": "https://accounts.google.com",
            "aud": "google-client",
            "sub": "g-123",
            "email": "Alice@Example.COM",
            "email_verified": true,
            "name": "Alice",
            "picture": "https://lh3.test/alice.png",
            "exp": Utc::now().timestamp() + 300,
            "nonce": "nonce-1"
        })
    }

    #[test]
    fn google_claims_validate_and_normalize() {
        let claims = google_claims();
        validate_id_token(Provider::Google, &oauth(), &claims, Some("nonce-1")).expect("valid");

        let profile = profile_from_claims(Provider::Google, &claims, None).expect("profile");
        assert_eq!(profile.provider, "google");
        assert_eq!(profile.provider_account_id, "g-123");
        assert_eq!(profile.email, "alice@example.com");
        assert!(profile.email_verified);
        assert_eq!(profile.name.as_deref(), Some("Alice"));
        assert_eq!(profile.avatar_url.as_deref(), Some("https://lh3.test/alice.png"));
    }

    #[test]
    fn validation_rejects_wrong_issuer_audience_expiry_nonce() {
        let oauth = oauth();

        let mut claims = google_claims();
        claims["iss"] = json!("https://evil.example");
        assert!(validate_id_token(Provider::Google, &oauth, &claims, Some("nonce-1")).is_err());

        let mut claims = google_claims();
        claims["aud"] = json!("other-client");
        assert!(validate_id_token(Provider::Google, &oauth, &claims, Some("nonce-1")).is_err());

        let mut claims = google_claims();
        claims["exp"] = json!(Utc::now().timestamp() - 10);
        assert!(validate_id_token(Provider::Google, &oauth, &claims, Some("nonce-1")).is_err());

        let claims = google_claims();
        assert!(validate_id_token(Provider::Google, &oauth, &claims, Some("other-nonce")).is_err());
    }

    #[test]
    fn microsoft_tenant_issuers_match_by_pattern() {
        let claims = json!({
            "iss": "https://login.microsoftonline.com/9122040d-6c67-4c5b-b112-36a304b66dad/v2.0",
            "aud": "ms-client",
            "sub": "ms-9",
            "preferred_username": "bob@contoso.com",
            "name": "Bob",
            "exp": Utc::now().timestamp() + 300
        });
        validate_id_token(Provider::Microsoft, &oauth(), &claims, None).expect("valid");

        let profile = profile_from_claims(Provider::Microsoft, &claims, None).expect("profile");
        assert_eq!(profile.email, "bob@contoso.com");
        assert!(profile.email_verified);

        let bad = json!({
            "iss": "https://login.microsoftonline.com.evil.example/x/v2.0",
            "aud": "ms-client",
            "exp": Utc::now().timestamp() + 300
        });
        assert!(validate_id_token(Provider::Microsoft, &oauth(), &bad, None).is_err());
    }

    #[test]
    fn apple_string_email_verified_and_user_blob_name() {
        let claims = json!({
            "iss": "https://appleid.apple.com",
            "aud": "apple-client",
            "sub": "apple-7",
            "email": "carol@privaterelay.appleid.com",
            "email_verified": "true",
            "exp": Utc::now().timestamp() + 300
        });
        let blob = r#"{"name":{"firstName":"Carol","lastName":"Chen"}}"#;
        let profile = profile_from_claims(Provider::Apple, &claims, Some(blob)).expect("profile");
        assert!(profile.email_verified);
        assert_eq!(profile.name.as_deref(), Some("Carol Chen"));

        let profile = profile_from_claims(Provider::Apple, &claims, None).expect("profile");
        assert!(profile.name.is_none());
    }

    #[test]
    fn missing_email_is_a_profile_error() {
        let claims = json!({
            "iss": "https://accounts.google.com",
            "aud": "google-client",
            "sub": "g-1",
            "exp": Utc::now().timestamp() + 300
        });
        assert!(matches!(
            profile_from_claims(Provider::Google, &claims, None),
            Err(OAuthError::Profile(_))
        ));
    }

    #[test]
    fn id_token_payload_decode_rejects_garbage() {
        assert!(decode_id_token_payload("garbage").is_err());
        assert!(decode_id_token_payload("a.!!!.c").is_err());

        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"x"}"#);
        let token = format!("h.{payload}.s");
        assert_eq!(decode_id_token_payload(&token).expect("ok")["sub"], "x");
    }
}
