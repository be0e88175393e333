//! Random token generation and digest helpers.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

/// Byte length for every bearer token handed to clients.
pub const TOKEN_BYTES: usize = 32;

/// Create a new random token encoded as lowercase hex.
///
/// Used for refresh tokens, authorization codes, reset tokens, and OAuth
/// state values. The raw value is only returned to the client; the database
/// stores a hash.
pub fn generate_token_hex() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate random token")?;
    Ok(hex::encode(bytes))
}

/// Create a new random token encoded as unpadded base64url.
///
/// Used for PKCE code verifiers, which RFC 7636 wants in the base64url
/// alphabet.
pub fn generate_token_base64url() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate random token")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a token so raw values never touch the database.
/// The hex digest is used for indexed lookups when the token is presented.
pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// PKCE S256 transform: `base64url(SHA-256(code_verifier))`.
pub fn pkce_challenge_s256(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Compare two byte strings without leaking the mismatch position.
///
/// The length check is allowed to short-circuit; lengths are public here
/// (digest outputs and stored records).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
