//! User rows: platform-wide identities.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::Instrument;
use uuid::Uuid;

use super::{is_unique_violation, query_span};

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub email_verified: bool,
    pub password_hash: Option<String>,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// Fields for a new user row; `password_hash` is None for federated-only
/// accounts.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub email_verified: bool,
    pub password_hash: Option<&'a str>,
    pub name: &'a str,
    pub avatar_url: Option<&'a str>,
}

/// Outcome when attempting to create a user.
#[derive(Debug)]
pub enum InsertOutcome {
    Created(User),
    /// The `users.email` uniqueness constraint fired; it is authoritative
    /// under concurrent registrations for the same address.
    EmailExists,
}

pub async fn insert(pool: &SqlitePool, new_user: &NewUser<'_>) -> Result<InsertOutcome> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let query = r"
        INSERT INTO users (id, email, email_verified, password_hash, name, avatar_url, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
    ";
    let span = query_span("INSERT", query);
    let result = sqlx::query(query)
        .bind(&id)
        .bind(new_user.email)
        .bind(new_user.email_verified)
        .bind(new_user.password_hash)
        .bind(new_user.name)
        .bind(new_user.avatar_url)
        .bind(&now)
        .execute(pool)
        .instrument(span)
        .await;

    match result {
        Ok(_) => Ok(InsertOutcome::Created(User {
            id,
            email: new_user.email.to_string(),
            email_verified: new_user.email_verified,
            password_hash: new_user.password_hash.map(ToString::to_string),
            name: new_user.name.to_string(),
            avatar_url: new_user.avatar_url.map(ToString::to_string),
        })),
        Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::EmailExists),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let query = r"
        SELECT id, email, email_verified, password_hash, name, avatar_url
        FROM users
        WHERE email = $1
    ";
    let span = query_span("SELECT", query);
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;
    Ok(row.map(|row| from_row(&row)))
}

pub async fn find_by_id(pool: &SqlitePool, user_id: &str) -> Result<Option<User>> {
    let query = r"
        SELECT id, email, email_verified, password_hash, name, avatar_url
        FROM users
        WHERE id = $1
    ";
    let span = query_span("SELECT", query);
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;
    Ok(row.map(|row| from_row(&row)))
}

pub async fn set_password_hash(pool: &SqlitePool, user_id: &str, hash: &str) -> Result<()> {
    let query = r"
        UPDATE users
        SET password_hash = $2, updated_at = $3
        WHERE id = $1
    ";
    let span = query_span("UPDATE", query);
    sqlx::query(query)
        .bind(user_id)
        .bind(hash)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password hash")?;
    Ok(())
}

/// Flip the verified flag to true. The flag is monotonic; there is no
/// operation that clears it.
pub async fn mark_email_verified(pool: &SqlitePool, user_id: &str) -> Result<()> {
    let query = r"
        UPDATE users
        SET email_verified = 1, updated_at = $2
        WHERE id = $1
    ";
    let span = query_span("UPDATE", query);
    sqlx::query(query)
        .bind(user_id)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark email verified")?;
    Ok(())
}

/// Fill name and avatar from a federated profile, only where empty.
pub async fn backfill_profile(
    pool: &SqlitePool,
    user_id: &str,
    name: Option<&str>,
    avatar_url: Option<&str>,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET name = CASE WHEN name = '' AND $2 IS NOT NULL THEN $2 ELSE name END,
            avatar_url = COALESCE(avatar_url, $3),
            updated_at = $4
        WHERE id = $1
    ";
    let span = query_span("UPDATE", query);
    sqlx::query(query)
        .bind(user_id)
        .bind(name)
        .bind(avatar_url)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to backfill user profile")?;
    Ok(())
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        email_verified: row.get("email_verified"),
        password_hash: row.get("password_hash"),
        name: row.get("name"),
        avatar_url: row.get("avatar_url"),
    }
}
