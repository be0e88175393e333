//! Refresh-token issue, rotation, and revocation.
//!
//! Tokens live in families. Rotation revokes the presented row and inserts a
//! successor in the same family; presenting an already-revoked token revokes
//! the whole family, which is the rotation-theft defense.

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::ClientMeta;
use crate::crypto::{generate_token_hex, sha256_hex};
use crate::store::refresh_tokens::{self, NewRefreshToken};

#[derive(Debug)]
pub struct IssuedToken {
    pub token: String,
    pub family_id: String,
}

#[derive(Debug)]
pub struct RotatedToken {
    pub token: String,
    pub user_id: String,
    pub family_id: String,
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("unknown refresh token")]
    Unknown,
    #[error("refresh token reuse detected, family revoked")]
    Reused,
    #[error("refresh token expired")]
    Expired,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Issue a refresh token in a brand-new family.
///
/// Called at the end of every successful authentication. The plaintext is
/// returned exactly once, for the Set-Cookie header.
pub async fn issue(
    pool: &SqlitePool,
    user_id: &str,
    ttl_seconds: i64,
    client: ClientMeta<'_>,
) -> Result<IssuedToken> {
    let token = generate_token_hex()?;
    let family_id = Uuid::new_v4().to_string();
    let now = Utc::now();

    refresh_tokens::insert(
        pool,
        &NewRefreshToken {
            id: &Uuid::new_v4().to_string(),
            user_id,
            token_hash: &sha256_hex(&token),
            family_id: &family_id,
            expires_at: now.timestamp() + ttl_seconds,
            created_at: now.timestamp_millis(),
            ip: client.ip,
            user_agent: client.user_agent,
        },
    )
    .await?;

    Ok(IssuedToken { token, family_id })
}

/// Rotate a presented refresh token.
///
/// Exactly one of two callers racing on the same token wins the conditional
/// revoke; the loser observes a revoked row and triggers family revocation.
pub async fn rotate(
    pool: &SqlitePool,
    presented: &str,
    ttl_seconds: i64,
    client: ClientMeta<'_>,
) -> Result<RotatedToken, RefreshError> {
    let stored = refresh_tokens::find_by_hash(pool, &sha256_hex(presented))
        .await?
        .ok_or(RefreshError::Unknown)?;

    let now = Utc::now();
    let now_ms = now.timestamp_millis();

    if stored.revoked_at.is_some() {
        // A previously rotated token came back: assume the family is stolen.
        let revoked = refresh_tokens::revoke_family(pool, &stored.family_id, now_ms).await?;
        warn!(
            family_id = %stored.family_id,
            revoked,
            "refresh token reuse detected"
        );
        return Err(RefreshError::Reused);
    }
    if stored.expires_at <= now.timestamp() {
        return Err(RefreshError::Expired);
    }

    if !refresh_tokens::revoke_if_active(pool, &stored.id, now_ms).await? {
        // Lost the race to a concurrent rotation of the same token.
        refresh_tokens::revoke_family(pool, &stored.family_id, now_ms).await?;
        return Err(RefreshError::Reused);
    }

    let token = generate_token_hex().map_err(RefreshError::Store)?;
    refresh_tokens::insert(
        pool,
        &NewRefreshToken {
            id: &Uuid::new_v4().to_string(),
            user_id: &stored.user_id,
            token_hash: &sha256_hex(&token),
            family_id: &stored.family_id,
            expires_at: now.timestamp() + ttl_seconds,
            // Strictly after the row it replaces, even within one millisecond.
            created_at: now_ms.max(stored.created_at + 1),
            ip: client.ip,
            user_agent: client.user_agent,
        },
    )
    .await?;

    Ok(RotatedToken {
        token,
        user_id: stored.user_id,
        family_id: stored.family_id,
    })
}

/// Revoke the single token behind a presented plaintext. Unknown tokens are
/// a no-op; logout is idempotent.
pub async fn revoke_presented(pool: &SqlitePool, presented: &str) -> Result<Option<String>> {
    let Some(stored) = refresh_tokens::find_by_hash(pool, &sha256_hex(presented)).await? else {
        return Ok(None);
    };
    refresh_tokens::revoke_if_active(pool, &stored.id, Utc::now().timestamp_millis()).await?;
    Ok(Some(stored.user_id))
}

/// Revoke every token a user holds, across all families.
pub async fn revoke_all_for_user(pool: &SqlitePool, user_id: &str) -> Result<u64> {
    Ok(refresh_tokens::revoke_all_for_user(pool, user_id, Utc::now().timestamp_millis()).await?)
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
                email: "refresh@test.shop",
                email_verified: true,
                password_hash: None,
                name: "Refresh",
                avatar_url: None,
            },
        )
        .await
        .expect("user") else {
            panic!("expected created");
        };
        (pool, user.id)
    }

    async fn active_count(pool: &SqlitePool, user_id: &str) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM refresh_tokens WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("count")
    }

    #[tokio::test]
    async fn rotation_keeps_family_and_invalidates_old_token() {
        let (pool, user_id) = pool_with_user().await;
        let issued = issue(&pool, &user_id, 3600, ClientMeta::default())
            .await
            .expect("issue");

        let rotated = rotate(&pool, &issued.token, 3600, ClientMeta::default())
            .await
            .expect("rotate");
        assert_eq!(rotated.family_id, issued.family_id);
        assert_eq!(rotated.user_id, user_id);
        assert_ne!(rotated.token, issued.token);
        assert_eq!(active_count(&pool, &user_id).await, 1);
    }

    #[tokio::test]
    async fn reuse_of_rotated_token_revokes_whole_family() {
        let (pool, user_id) = pool_with_user().await;
        let issued = issue(&pool, &user_id, 3600, ClientMeta::default())
            .await
            .expect("issue");
        let rotated = rotate(&pool, &issued.token, 3600, ClientMeta::default())
            .await
            .expect("rotate");

        // Attacker replays the pre-rotation token.
        assert!(matches!(
            rotate(&pool, &issued.token, 3600, ClientMeta::default()).await,
            Err(RefreshError::Reused)
        ));
        assert_eq!(active_count(&pool, &user_id).await, 0);

        // The legitimate successor is dead too.
        assert!(matches!(
            rotate(&pool, &rotated.token, 3600, ClientMeta::default()).await,
            Err(RefreshError::Reused)
        ));
    }

    #[tokio::test]
    async fn unknown_and_expired_tokens_are_rejected() {
        let (pool, user_id) = pool_with_user().await;
        assert!(matches!(
            rotate(&pool, "no-such-token", 3600, ClientMeta::default()).await,
            Err(RefreshError::Unknown)
        ));

        let issued = issue(&pool, &user_id, -10, ClientMeta::default())
            .await
            .expect("issue");
        assert!(matches!(
            rotate(&pool, &issued.token, 3600, ClientMeta::default()).await,
            Err(RefreshError::Expired)
        ));
    }

    #[tokio::test]
    async fn successor_row_orders_strictly_after_predecessor() {
        let (pool, user_id) = pool_with_user().await;
        let issued = issue(&pool, &user_id, 3600, ClientMeta::default())
            .await
            .expect("issue");
        rotate(&pool, &issued.token, 3600, ClientMeta::default())
            .await
            .expect("rotate");

        let rows: Vec<(Option<i64>, i64)> = sqlx::query_as(
            "SELECT revoked_at, created_at FROM refresh_tokens WHERE family_id = $1 ORDER BY created_at ASC",
        )
        .bind(&issued.family_id)
        .fetch_all(&pool)
        .await
        .expect("rows");

        assert_eq!(rows.len(), 2);
        let (old_revoked, old_created) = &rows[0];
        let (new_revoked, new_created) = &rows[1];
        assert!(old_revoked.is_some());
        assert!(new_revoked.is_none());
        assert!(new_created > old_created);
    }

    #[tokio::test]
    async fn revoke_presented_and_revoke_all() {
        let (pool, user_id) = pool_with_user().await;
        let first = issue(&pool, &user_id, 3600, ClientMeta::default())
            .await
            .expect("issue");
        let _second = issue(&pool, &user_id, 3600, ClientMeta::default())
            .await
            .expect("issue");

        let owner = revoke_presented(&pool, &first.token).await.expect("revoke");
        assert_eq!(owner.as_deref(), Some(user_id.as_str()));
        assert_eq!(active_count(&pool, &user_id).await, 1);

        assert!(revoke_presented(&pool, "missing").await.expect("revoke").is_none());

        revoke_all_for_user(&pool, &user_id).await.expect("revoke all");
        assert_eq!(active_count(&pool, &user_id).await, 0);
    }
}
