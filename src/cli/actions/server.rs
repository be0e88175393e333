use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};

use crate::api::{self, Dependencies};
use crate::config::Config;
use crate::jwt::JwtKeys;
use crate::store;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub config: Config,
    pub jwt_private_key: SecretString,
    pub jwt_public_key: String,
}

/// Accept a key either as PEM or as base64-wrapped PEM, the way deployment
/// tooling usually injects multi-line secrets.
pub(crate) fn decode_key_material(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.starts_with("-----BEGIN") {
        return Ok(trimmed.to_string());
    }
    let decoded = STANDARD
        .decode(trimmed.as_bytes())
        .context("key is neither PEM nor base64")?;
    let pem = String::from_utf8(decoded).context("decoded key is not utf-8")?;
    if !pem.trim_start().starts_with("-----BEGIN") {
        anyhow::bail!("decoded key does not look like PEM");
    }
    Ok(pem)
}

/// Execute the server action.
/// # Errors
/// Returns an error if key material is invalid, the database is unreachable,
/// or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let private_pem = decode_key_material(args.jwt_private_key.expose_secret())
        .context("invalid JWT_PRIVATE_KEY")?;
    let public_pem = decode_key_material(&args.jwt_public_key).context("invalid JWT_PUBLIC_KEY")?;
    let keys = JwtKeys::from_pem(&private_pem, &public_pem)?;

    let pool = store::connect(&args.dsn).await?;
    store::migrate(&pool).await?;

    api::serve(args.port, Dependencies::new(pool, args.config, keys)).await
}
