//! Refresh token rows, grouped into families for theft containment.
//!
//! Timestamps on this table are unix milliseconds so that a rotation's new
//! row orders strictly after the row it replaces.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use tracing::Instrument;

use super::query_span;

#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub id: String,
    pub user_id: String,
    pub family_id: String,
    pub expires_at: i64,
    pub revoked_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug)]
pub struct NewRefreshToken<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub token_hash: &'a str,
    pub family_id: &'a str,
    pub expires_at: i64,
    pub created_at: i64,
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

pub async fn insert(pool: &SqlitePool, token: &NewRefreshToken<'_>) -> Result<()> {
    let query = r"
        INSERT INTO refresh_tokens
            (id, user_id, token_hash, family_id, expires_at, created_at, ip, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ";
    let span = query_span("INSERT", query);
    sqlx::query(query)
        .bind(token.id)
        .bind(token.user_id)
        .bind(token.token_hash)
        .bind(token.family_id)
        .bind(token.expires_at)
        .bind(token.created_at)
        .bind(token.ip)
        .bind(token.user_agent)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert refresh token")?;
    Ok(())
}

pub async fn find_by_hash(pool: &SqlitePool, token_hash: &str) -> Result<Option<RefreshToken>> {
    let query = r"
        SELECT id, user_id, family_id, expires_at, revoked_at, created_at
        FROM refresh_tokens
        WHERE token_hash = $1
    ";
    let span = query_span("SELECT", query);
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup refresh token")?;

    Ok(row.map(|row| RefreshToken {
        id: row.get("id"),
        user_id: row.get("user_id"),
        family_id: row.get("family_id"),
        expires_at: row.get("expires_at"),
        revoked_at: row.get("revoked_at"),
        created_at: row.get("created_at"),
    }))
}

/// Mark a token revoked iff it is still active.
///
/// Returns false when another caller revoked it first; rotation treats that
/// as a lost race and escalates to family revocation.
pub async fn revoke_if_active(pool: &SqlitePool, id: &str, now_ms: i64) -> Result<bool> {
    let query = r"
        UPDATE refresh_tokens
        SET revoked_at = $2, last_used_at = $2
        WHERE id = $1 AND revoked_at IS NULL
    ";
    let span = query_span("UPDATE", query);
    let result = sqlx::query(query)
        .bind(id)
        .bind(now_ms)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke refresh token")?;
    Ok(result.rows_affected() == 1)
}

/// Revoke every member of a family that is still active.
pub async fn revoke_family(pool: &SqlitePool, family_id: &str, now_ms: i64) -> Result<u64> {
    let query = r"
        UPDATE refresh_tokens
        SET revoked_at = $2
        WHERE family_id = $1 AND revoked_at IS NULL
    ";
    let span = query_span("UPDATE", query);
    let result = sqlx::query(query)
        .bind(family_id)
        .bind(now_ms)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke refresh token family")?;
    Ok(result.rows_affected())
}

/// Revoke every active token for a user, across all families.
pub async fn revoke_all_for_user(pool: &SqlitePool, user_id: &str, now_ms: i64) -> Result<u64> {
    let query = r"
        UPDATE refresh_tokens
        SET revoked_at = $2
        WHERE user_id = $1 AND revoked_at IS NULL
    ";
    let span = query_span("UPDATE", query);
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(now_ms)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke user refresh tokens")?;
    Ok(result.rows_affected())
}
