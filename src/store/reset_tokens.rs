//! Password-reset tokens, single-use by stamping `used_at`.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use tracing::Instrument;

use super::query_span;

#[derive(Debug, Clone)]
pub struct ResetToken {
    pub user_id: String,
    pub expires_at: i64,
}

pub async fn insert(
    pool: &SqlitePool,
    token_hash: &str,
    user_id: &str,
    expires_at: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO password_reset_tokens (token_hash, user_id, expires_at)
        VALUES ($1, $2, $3)
    ";
    let span = query_span("INSERT", query);
    sqlx::query(query)
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert reset token")?;
    Ok(())
}

/// Stamp the token used and return it, iff it was still unused.
///
/// The conditional UPDATE RETURNING makes consumption single-use; a second
/// caller finds no unused row. Expiry is checked by the caller so an expired
/// token is still burned.
pub async fn consume(pool: &SqlitePool, token_hash: &str, now: i64) -> Result<Option<ResetToken>> {
    let query = r"
        UPDATE password_reset_tokens
        SET used_at = $2
        WHERE token_hash = $1 AND used_at IS NULL
        RETURNING user_id, expires_at
    ";
    let span = query_span("UPDATE", query);
    let row = sqlx::query(query)
        .bind(token_hash)
        .bind(now)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume reset token")?;

    Ok(row.map(|row| ResetToken {
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
    }))
}
