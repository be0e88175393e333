//! Federation-flow state rows pinning one provider round-trip.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use tracing::Instrument;

use super::query_span;

#[derive(Debug, Clone)]
pub struct FederationState {
    pub tenant_id: String,
    pub redirect_url: String,
    pub code_verifier: String,
    pub nonce: Option<String>,
    pub provider: String,
    pub expires_at: i64,
}

#[derive(Debug)]
pub struct NewFederationState<'a> {
    pub state: &'a str,
    pub tenant_id: &'a str,
    pub redirect_url: &'a str,
    pub code_verifier: &'a str,
    pub nonce: Option<&'a str>,
    pub provider: &'a str,
    pub expires_at: i64,
}

pub async fn insert(pool: &SqlitePool, state: &NewFederationState<'_>) -> Result<()> {
    let query = r"
        INSERT INTO oauth_states
            (state, tenant_id, redirect_url, code_verifier, nonce, provider, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
    ";
    let span = query_span("INSERT", query);
    sqlx::query(query)
        .bind(state.state)
        .bind(state.tenant_id)
        .bind(state.redirect_url)
        .bind(state.code_verifier)
        .bind(state.nonce)
        .bind(state.provider)
        .bind(state.expires_at)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert federation state")?;
    Ok(())
}

/// Remove and return the state row; single-use under contention.
pub async fn consume(pool: &SqlitePool, state: &str) -> Result<Option<FederationState>> {
    let query = r"
        DELETE FROM oauth_states
        WHERE state = $1
        RETURNING tenant_id, redirect_url, code_verifier, nonce, provider, expires_at
    ";
    let span = query_span("DELETE", query);
    let row = sqlx::query(query)
        .bind(state)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume federation state")?;

    Ok(row.map(|row| FederationState {
        tenant_id: row.get("tenant_id"),
        redirect_url: row.get("redirect_url"),
        code_verifier: row.get("code_verifier"),
        nonce: row.get("nonce"),
        provider: row.get("provider"),
        expires_at: row.get("expires_at"),
    }))
}

/// Storage reclamation only; the callback checks `expires_at` itself.
pub async fn sweep_expired(pool: &SqlitePool, now: i64) -> Result<u64> {
    let query = "DELETE FROM oauth_states WHERE expires_at <= $1";
    let span = query_span("DELETE", query);
    let result = sqlx::query(query)
        .bind(now)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to sweep expired federation states")?;
    Ok(result.rows_affected())
}
