//! JWKS discovery document for downstream verifiers.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use utoipa::ToSchema;

use super::JwtKeys;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub use_field: String,
    pub kid: String,
    pub x: String,
    pub y: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// Build the document for the current signing key.
#[must_use]
pub fn document(keys: &JwtKeys) -> JwksDocument {
    let (x, y) = keys.jwk_coordinates();
    JwksDocument {
        keys: vec![Jwk {
            kty: "EC".to_string(),
            crv: "P-256".to_string(),
            alg: "ES256".to_string(),
            use_field: "sig".to_string(),
            kid: keys.kid().to_string(),
            x: x.to_string(),
            y: y.to_string(),
        }],
    }
}

static CACHED: OnceLock<(String, String)> = OnceLock::new();

/// Serialized document plus its ETag, computed once per process.
///
/// The key never changes within a process lifetime, so the first render is
/// authoritative for every later request.
pub fn cached_body(keys: &JwtKeys) -> &'static (String, String) {
    CACHED.get_or_init(|| {
        let body = serde_json::to_string(&document(keys))
            .unwrap_or_else(|_| r#"{"keys":[]}"#.to_string());
        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        let etag = format!("\"{}\"", hex::encode(hasher.finalize()));
        (body, etag)
    })
}
