//! Authorization codes: one-shot exchange records keyed by code hash.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use tracing::Instrument;

use super::query_span;

#[derive(Debug, Clone)]
pub struct AuthCode {
    pub user_id: String,
    pub tenant_id: String,
    pub redirect_origin: String,
    pub audience: String,
    pub expires_at: i64,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

#[derive(Debug)]
pub struct NewAuthCode<'a> {
    pub code_hash: &'a str,
    pub user_id: &'a str,
    pub tenant_id: &'a str,
    pub redirect_origin: &'a str,
    pub audience: &'a str,
    pub expires_at: i64,
    pub code_challenge: Option<&'a str>,
    pub code_challenge_method: Option<&'a str>,
}

pub async fn insert(pool: &SqlitePool, code: &NewAuthCode<'_>) -> Result<()> {
    let query = r"
        INSERT INTO auth_codes
            (code_hash, user_id, tenant_id, redirect_origin, audience, expires_at, code_challenge, code_challenge_method)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ";
    let span = query_span("INSERT", query);
    sqlx::query(query)
        .bind(code.code_hash)
        .bind(code.user_id)
        .bind(code.tenant_id)
        .bind(code.redirect_origin)
        .bind(code.audience)
        .bind(code.expires_at)
        .bind(code.code_challenge)
        .bind(code.code_challenge_method)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert auth code")?;
    Ok(())
}

/// Remove and return the row for this code hash.
///
/// A single DELETE RETURNING keeps consumption atomic under contention: at
/// most one caller sees the row, and the row is gone even when the caller
/// later fails validation.
pub async fn consume(pool: &SqlitePool, code_hash: &str) -> Result<Option<AuthCode>> {
    let query = r"
        DELETE FROM auth_codes
        WHERE code_hash = $1
        RETURNING user_id, tenant_id, redirect_origin, audience, expires_at,
                  code_challenge, code_challenge_method
    ";
    let span = query_span("DELETE", query);
    let row = sqlx::query(query)
        .bind(code_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume auth code")?;

    Ok(row.map(|row| AuthCode {
        user_id: row.get("user_id"),
        tenant_id: row.get("tenant_id"),
        redirect_origin: row.get("redirect_origin"),
        audience: row.get("audience"),
        expires_at: row.get("expires_at"),
        code_challenge: row.get("code_challenge"),
        code_challenge_method: row.get("code_challenge_method"),
    }))
}

/// Storage reclamation only; consumers check `expires_at` themselves.
pub async fn sweep_expired(pool: &SqlitePool, now: i64) -> Result<u64> {
    let query = "DELETE FROM auth_codes WHERE expires_at <= $1";
    let span = query_span("DELETE", query);
    let result = sqlx::query(query)
        .bind(now)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to sweep expired auth codes")?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::users::{InsertOutcome, NewUser, insert as insert_user};
    use crate::store::{connect_in_memory, migrate};

    async fn pool_with_user() -> (SqlitePool, String) {
        let pool = connect_in_memory().await.expect("pool");
        migrate(&pool).await.expect("migrate");
        let InsertOutcome::Created(user) = insert_user(
            &pool,
            &NewUser {
                email: "codes@test.shop",
                email_verified: true,
                password_hash: None,
                name: "Codes",
                avatar_url: None,
            },
        )
        .await
        .expect("user") else {
            panic!("expected created");
        };
        (pool, user.id)
    }

    #[tokio::test]
    async fn consume_is_single_use() {
        let (pool, user_id) = pool_with_user().await;
        insert(
            &pool,
            &NewAuthCode {
                code_hash: "hash-1",
                user_id: &user_id,
                tenant_id: "t1",
                redirect_origin: "https://store-a.centerpiece.shop",
                audience: "storefront",
                expires_at: 4_102_444_800,
                code_challenge: None,
                code_challenge_method: None,
            },
        )
        .await
        .expect("insert");

        let first = consume(&pool, "hash-1").await.expect("consume");
        assert!(first.is_some());
        let code = first.expect("row");
        assert_eq!(code.user_id, user_id);
        assert_eq!(code.audience, "storefront");

        let second = consume(&pool, "hash-1").await.expect("consume");
        assert!(second.is_none(), "code must be gone after first consume");
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_rows() {
        let (pool, user_id) = pool_with_user().await;
        for (hash, expires_at) in [("old", 100), ("fresh", 4_102_444_800)] {
            insert(
                &pool,
                &NewAuthCode {
                    code_hash: hash,
                    user_id: &user_id,
                    tenant_id: "t1",
                    redirect_origin: "https://store-a.centerpiece.shop",
                    audience: "storefront",
                    expires_at,
                    code_challenge: None,
                    code_challenge_method: None,
                },
            )
            .await
            .expect("insert");
        }

        let removed = sweep_expired(&pool, 1_000).await.expect("sweep");
        assert_eq!(removed, 1);
        assert!(consume(&pool, "fresh").await.expect("consume").is_some());
    }
}
