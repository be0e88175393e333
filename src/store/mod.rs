//! Typed data access over the seven auth tables.
//!
//! Every operation binds parameters and runs inside a `db.query` span. The
//! backing engine is SQLite; referential integrity is a per-connection
//! pragma, so the pool enables it on every connection it opens.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::Span;

pub mod auth_codes;
pub mod identities;
pub mod memberships;
pub mod oauth_states;
pub mod refresh_tokens;
pub mod reset_tokens;
pub mod users;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    email_verified INTEGER NOT NULL DEFAULT 0,
    password_hash TEXT,
    name TEXT NOT NULL,
    avatar_url TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tenant_memberships (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    tenant_id TEXT NOT NULL,
    role TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (user_id, tenant_id, role)
);

CREATE TABLE IF NOT EXISTS oauth_accounts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    provider TEXT NOT NULL,
    provider_account_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (provider, provider_account_id)
);

CREATE TABLE IF NOT EXISTS auth_codes (
    code_hash TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    tenant_id TEXT NOT NULL,
    redirect_origin TEXT NOT NULL,
    audience TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    code_challenge TEXT,
    code_challenge_method TEXT
);

CREATE TABLE IF NOT EXISTS refresh_tokens (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    token_hash TEXT NOT NULL UNIQUE,
    family_id TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    revoked_at INTEGER,
    last_used_at INTEGER,
    created_at INTEGER NOT NULL,
    ip TEXT,
    user_agent TEXT
);
CREATE INDEX IF NOT EXISTS idx_refresh_tokens_family ON refresh_tokens(family_id);
CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id);

CREATE TABLE IF NOT EXISTS oauth_states (
    state TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    redirect_url TEXT NOT NULL,
    code_verifier TEXT NOT NULL,
    nonce TEXT,
    provider TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS password_reset_tokens (
    token_hash TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expires_at INTEGER NOT NULL,
    used_at INTEGER
);
";

/// Open a pool against the given SQLite path or URL.
///
/// `foreign_keys` is set on the connect options so every pooled connection
/// enforces referential integrity before its first query.
pub async fn connect(dsn: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(dsn)
        .with_context(|| format!("invalid database path: {dsn}"))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to connect to database")
}

/// In-memory pool for tests; one connection, since each in-memory
/// connection is its own database.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .context("invalid in-memory dsn")?
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .context("failed to open in-memory database")
}

/// Create the seven tables if they do not exist yet.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("failed to run schema statement: {statement}"))?;
    }
    Ok(())
}

pub(crate) fn query_span(operation: &str, statement: &str) -> Span {
    tracing::info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = operation,
        db.statement = statement
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.kind() == sqlx::error::ErrorKind::UniqueViolation,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let pool = connect_in_memory().await.expect("pool");
        migrate(&pool).await.expect("first migrate");
        migrate(&pool).await.expect("second migrate");
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let pool = connect_in_memory().await.expect("pool");
        migrate(&pool).await.expect("migrate");

        let result = sqlx::query(
            "INSERT INTO tenant_memberships (id, user_id, tenant_id, role, status, created_at)
             VALUES ('m1', 'missing-user', 't1', 'customer', 'active', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err(), "membership without user must be rejected");
    }

    #[tokio::test]
    async fn is_unique_violation_detects_duplicate_email() {
        let pool = connect_in_memory().await.expect("pool");
        migrate(&pool).await.expect("migrate");

        let insert = "INSERT INTO users (id, email, name, created_at, updated_at)
                      VALUES ($1, 'dup@test.shop', 'Dup', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')";
        sqlx::query(insert)
            .bind("u1")
            .execute(&pool)
            .await
            .expect("first insert");
        let err = sqlx::query(insert)
            .bind("u2")
            .execute(&pool)
            .await
            .expect_err("duplicate email");
        assert!(is_unique_violation(&err));

        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
