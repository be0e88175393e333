//! Apple-specific pieces: the on-the-fly client secret and the first-login
//! user blob.

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::AppleClientConfig;

/// Apple accepts client secrets for up to six months; we mint short ones.
const CLIENT_SECRET_TTL_SECONDS: i64 = 5 * 60;

const APPLE_AUDIENCE: &str = "https://appleid.apple.com";

#[derive(Debug, Serialize)]
struct ClientSecretClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Sign a short-lived ES256 JWT that stands in for a static client secret.
pub fn client_secret(config: &AppleClientConfig) -> Result<String> {
    let key = EncodingKey::from_ec_pem(config.private_key_pem.expose_secret().as_bytes())
        .context("invalid Apple signing key")?;

    let now = Utc::now().timestamp();
    let claims = ClientSecretClaims {
        iss: &config.team_id,
        sub: &config.client_id,
        aud: APPLE_AUDIENCE,
        iat: now,
        exp: now + CLIENT_SECRET_TTL_SECONDS,
    };

    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(config.key_id.clone());

    jsonwebtoken::encode(&header, &claims, &key).context("failed to sign Apple client secret")
}

/// The `user` form field Apple posts on the first login only.
#[derive(Debug, Deserialize)]
pub struct AppleUserBlob {
    pub name: Option<AppleUserName>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppleUserName {
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName")]
    pub last_name: Option<String>,
}

/// Extract a display name from the first-login blob, if any.
#[must_use]
pub fn name_from_user_blob(blob: &str) -> Option<String> {
    let parsed: AppleUserBlob = serde_json::from_str(blob).ok()?;
    let name = parsed.name?;
    let full = match (name.first_name, name.last_name) {
        (Some(first), Some(last)) => format!("{first} {last}"),
        (Some(first), None) => first,
        (None, Some(last)) => last,
        (None, None) => return None,
    };
    let full = full.trim().to_string();
    if full.is_empty() { None } else { Some(full) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use secrecy::SecretString;

    fn config() -> AppleClientConfig {
        AppleClientConfig {
            client_id: "shop.centerpiece.signin".to_string(),
            team_id: "TEAM123456".to_string(),
            key_id: "KEY1234567".to_string(),
            private_key_pem: SecretString::from(
                crate::jwt::test_keys::PRIVATE_KEY_PEM.to_string(),
            ),
            token_url: None,
        }
    }

    #[test]
    fn client_secret_is_a_signed_es256_jwt() {
        let secret = client_secret(&config()).expect("secret");
        let mut parts = secret.split('.');

        let header: serde_json::Value = serde_json::from_slice(
            &URL_SAFE_NO_PAD
                .decode(parts.next().expect("header"))
                .expect("decode"),
        )
        .expect("json");
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["kid"], "KEY1234567");

        let claims: serde_json::Value = serde_json::from_slice(
            &URL_SAFE_NO_PAD
                .decode(parts.next().expect("claims"))
                .expect("decode"),
        )
        .expect("json");
        assert_eq!(claims["iss"], "TEAM123456");
        assert_eq!(claims["sub"], "shop.centerpiece.signin");
        assert_eq!(claims["aud"], "https://appleid.apple.com");
        let lifetime = claims["exp"].as_i64().expect("exp") - claims["iat"].as_i64().expect("iat");
        assert_eq!(lifetime, 300);
    }

    #[test]
    fn user_blob_name_extraction() {
        assert_eq!(
            name_from_user_blob(r#"{"name":{"firstName":"Ada","lastName":"Lovelace"}}"#),
            Some("Ada Lovelace".to_string())
        );
        assert_eq!(
            name_from_user_blob(r#"{"name":{"firstName":"Ada"}}"#),
            Some("Ada".to_string())
        );
        assert_eq!(name_from_user_blob(r#"{"email":"a@b.test"}"#), None);
        assert_eq!(name_from_user_blob("not json"), None);
        assert_eq!(name_from_user_blob(r#"{"name":{}}"#), None);
    }
}
