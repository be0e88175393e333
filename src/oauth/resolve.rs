//! Resolution of a federated profile to a platform user.

use anyhow::{Context, anyhow};
use sqlx::SqlitePool;

use super::{FederatedProfile, OAuthError};
use crate::crypto::sha256_hex;
use crate::store::users::{self, InsertOutcome, NewUser, User};
use crate::store::identities;

/// Map a normalized profile onto a user, creating rows as needed.
///
/// The ladder, in order: existing link wins; a verified email may claim an
/// existing account; an unverified email never may, and gets a separate user
/// instead; otherwise a fresh user is created. The unverified split is the
/// defense against account takeover through providers that hand out
/// addresses they never confirmed.
pub async fn resolve_user(
    pool: &SqlitePool,
    profile: &FederatedProfile,
) -> Result<User, OAuthError> {
    if let Some(link) = identities::find(pool, &profile.provider, &profile.provider_account_id).await?
    {
        users::backfill_profile(
            pool,
            &link.user_id,
            profile.name.as_deref(),
            profile.avatar_url.as_deref(),
        )
        .await?;
        let user = users::find_by_id(pool, &link.user_id)
            .await?
            .ok_or_else(|| anyhow!("identity link points at missing user {}", link.user_id))?;
        return Ok(user);
    }

    if let Some(existing) = users::find_by_email(pool, &profile.email).await? {
        if profile.email_verified {
            identities::insert(
                pool,
                &existing.id,
                &profile.provider,
                &profile.provider_account_id,
            )
            .await?;
            users::backfill_profile(
                pool,
                &existing.id,
                profile.name.as_deref(),
                profile.avatar_url.as_deref(),
            )
            .await?;
            users::mark_email_verified(pool, &existing.id).await?;
            let user = users::find_by_id(pool, &existing.id)
                .await?
                .ok_or_else(|| anyhow!("linked user {} disappeared", existing.id))?;
            return Ok(user);
        }
        // Unverified address colliding with an existing account: a separate
        // user under a provider-scoped alias, never a link.
        return create_linked_user(pool, profile, &alias_email(profile)).await;
    }

    create_linked_user(pool, profile, &profile.email).await
}

async fn create_linked_user(
    pool: &SqlitePool,
    profile: &FederatedProfile,
    email: &str,
) -> Result<User, OAuthError> {
    let name = profile.name.clone().unwrap_or_else(|| local_part(email));
    let outcome = users::insert(
        pool,
        &NewUser {
            email,
            email_verified: profile.email_verified,
            password_hash: None,
            name: &name,
            avatar_url: profile.avatar_url.as_deref(),
        },
    )
    .await?;

    let user = match outcome {
        InsertOutcome::Created(user) => user,
        InsertOutcome::EmailExists => {
            // Lost a race with a concurrent sign-in for the same address; a
            // verified profile may still claim the winner.
            if !profile.email_verified {
                return Err(OAuthError::Internal(anyhow!(
                    "alias collision for provider account"
                )));
            }
            users::find_by_email(pool, email)
                .await?
                .context("conflicting user vanished")?
        }
    };

    identities::insert(pool, &user.id, &profile.provider, &profile.provider_account_id).await?;
    Ok(user)
}

fn local_part(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

/// Provider-scoped address for the unverified split, keeping `users.email`
/// unique while recording where the account came from.
fn alias_email(profile: &FederatedProfile) -> String {
    let tag = &sha256_hex(&profile.provider_account_id)[..8];
    match profile.email.split_once('@') {
        Some((local, domain)) => format!("{local}+{}-{tag}@{domain}", profile.provider),
        None => format!("{}-{tag}@invalid.local", profile.provider),
    }
}
