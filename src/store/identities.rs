//! Federated identity links: one provider account maps to one user.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::Instrument;
use uuid::Uuid;

use super::query_span;

#[derive(Debug, Clone)]
pub struct IdentityLink {
    pub user_id: String,
    pub provider: String,
    pub provider_account_id: String,
}

pub async fn find(
    pool: &SqlitePool,
    provider: &str,
    provider_account_id: &str,
) -> Result<Option<IdentityLink>> {
    let query = r"
        SELECT user_id, provider, provider_account_id
        FROM oauth_accounts
        WHERE provider = $1 AND provider_account_id = $2
    ";
    let span = query_span("SELECT", query);
    let row = sqlx::query(query)
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup identity link")?;

    Ok(row.map(|row| IdentityLink {
        user_id: row.get("user_id"),
        provider: row.get("provider"),
        provider_account_id: row.get("provider_account_id"),
    }))
}

pub async fn insert(
    pool: &SqlitePool,
    user_id: &str,
    provider: &str,
    provider_account_id: &str,
) -> Result<()> {
    let query = r"
        INSERT INTO oauth_accounts (id, user_id, provider, provider_account_id, created_at)
        VALUES ($1, $2, $3, $4, $5)
    ";
    let span = query_span("INSERT", query);
    sqlx::query(query)
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(provider)
        .bind(provider_account_id)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert identity link")?;
    Ok(())
}
