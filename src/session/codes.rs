//! Authorization code mint and exchange.
//!
//! Codes are one-shot bearer values bound to (user, tenant, redirect-origin,
//! audience, optional PKCE challenge). The exchange consumes first and
//! validates second, so a failed exchange still burns the code.

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::warn;

use crate::crypto::{constant_time_eq, generate_token_hex, pkce_challenge_s256, sha256_hex};
use crate::store::auth_codes::{self, AuthCode, NewAuthCode};

#[derive(Debug)]
pub struct MintCode<'a> {
    pub user_id: &'a str,
    pub tenant_id: &'a str,
    pub redirect_origin: &'a str,
    pub audience: &'a str,
    pub code_challenge: Option<&'a str>,
    pub ttl_seconds: i64,
}

#[derive(Debug)]
pub struct ExchangeRequest<'a> {
    pub code: &'a str,
    pub tenant_id: &'a str,
    pub redirect_origin: &'a str,
    pub code_verifier: Option<&'a str>,
}

/// Why an exchange was refused. Handlers collapse every variant into the
/// same generic message; the distinction exists for logs and tests.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("unknown or already used authorization code")]
    UnknownCode,
    #[error("authorization code expired")]
    Expired,
    #[error("tenant mismatch")]
    TenantMismatch,
    #[error("redirect origin mismatch")]
    OriginMismatch,
    #[error("pkce verification failed")]
    PkceMismatch,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Mint a fresh code and return the plaintext exactly once.
pub async fn mint(pool: &SqlitePool, params: &MintCode<'_>) -> Result<String> {
    let code = generate_token_hex()?;
    let now = Utc::now().timestamp();

    auth_codes::insert(
        pool,
        &NewAuthCode {
            code_hash: &sha256_hex(&code),
            user_id: params.user_id,
            tenant_id: params.tenant_id,
            redirect_origin: params.redirect_origin,
            audience: params.audience,
            expires_at: now + params.ttl_seconds,
            code_challenge: params.code_challenge,
            code_challenge_method: params.code_challenge.map(|_| "S256"),
        },
    )
    .await?;

    // Reclaim storage while we are here; correctness never depends on it.
    if let Err(err) = auth_codes::sweep_expired(pool, now).await {
        warn!("auth code sweep failed: {err:#}");
    }

    Ok(code)
}

/// Consume a presented code and check its bindings.
pub async fn exchange(
    pool: &SqlitePool,
    request: &ExchangeRequest<'_>,
) -> Result<AuthCode, ExchangeError> {
    let stored = auth_codes::consume(pool, &sha256_hex(request.code))
        .await?
        .ok_or(ExchangeError::UnknownCode)?;

    if stored.expires_at <= Utc::now().timestamp() {
        return Err(ExchangeError::Expired);
    }
    if stored.tenant_id != request.tenant_id {
        return Err(ExchangeError::TenantMismatch);
    }
    if stored.redirect_origin != request.redirect_origin {
        return Err(ExchangeError::OriginMismatch);
    }
    if let Some(challenge) = &stored.code_challenge {
        let Some(verifier) = request.code_verifier else {
            return Err(ExchangeError::PkceMismatch);
        };
        let derived = pkce_challenge_s256(verifier);
        if !constant_time_eq(derived.as_bytes(), challenge.as_bytes()) {
            return Err(ExchangeError::PkceMismatch);
        }
    }

    Ok(stored)
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

    fn mint_params<'a>(user_id: &'a str, challenge: Option<&'a str>) -> MintCode<'a> {
        MintCode {
            user_id,
            tenant_id: "t1",
            redirect_origin: "https://store-a.centerpiece.shop",
            audience: "storefront",
            code_challenge: challenge,
            ttl_seconds: 60,
        }
    }

    #[tokio::test]
    async fn exchange_happy_path_then_replay_fails() {
        let (pool, user_id) = pool_with_user().await;
        let code = mint(&pool, &mint_params(&user_id, None)).await.expect("mint");
        assert_eq!(code.len(), 64);

        let request = ExchangeRequest {
            code: &code,
            tenant_id: "t1",
            redirect_origin: "https://store-a.centerpiece.shop",
            code_verifier: None,
        };
        let stored = exchange(&pool, &request).await.expect("exchange");
        assert_eq!(stored.user_id, user_id);
        assert_eq!(stored.audience, "storefront");

        assert!(matches!(
            exchange(&pool, &request).await,
            Err(ExchangeError::UnknownCode)
        ));
    }

    #[tokio::test]
    async fn mismatched_origin_burns_the_code() {
        let (pool, user_id) = pool_with_user().await;
        let code = mint(&pool, &mint_params(&user_id, None)).await.expect("mint");

        let wrong = ExchangeRequest {
            code: &code,
            tenant_id: "t1",
            redirect_origin: "https://evil.example.net",
            code_verifier: None,
        };
        assert!(matches!(
            exchange(&pool, &wrong).await,
            Err(ExchangeError::OriginMismatch)
        ));

        // Retrying with the correct origin must also fail now.
        let correct = ExchangeRequest {
            code: &code,
            tenant_id: "t1",
            redirect_origin: "https://store-a.centerpiece.shop",
            code_verifier: None,
        };
        assert!(matches!(
            exchange(&pool, &correct).await,
            Err(ExchangeError::UnknownCode)
        ));
    }

    #[tokio::test]
    async fn tenant_mismatch_is_rejected() {
        let (pool, user_id) = pool_with_user().await;
        let code = mint(&pool, &mint_params(&user_id, None)).await.expect("mint");
        let request = ExchangeRequest {
            code: &code,
            tenant_id: "t2",
            redirect_origin: "https://store-a.centerpiece.shop",
            code_verifier: None,
        };
        assert!(matches!(
            exchange(&pool, &request).await,
            Err(ExchangeError::TenantMismatch)
        ));
    }

    #[tokio::test]
    async fn pkce_bound_codes_require_the_right_verifier() {
        let (pool, user_id) = pool_with_user().await;
        let verifier = "correct-horse-battery-staple-and-then-some";
        let challenge = pkce_challenge_s256(verifier);
        let code = mint(&pool, &mint_params(&user_id, Some(&challenge)))
            .await
            .expect("mint");

        let base = |code_verifier| ExchangeRequest {
            code: &code,
            tenant_id: "t1",
            redirect_origin: "https://store-a.centerpiece.shop",
            code_verifier,
        };
        assert!(matches!(
            exchange(&pool, &base(None)).await,
            Err(ExchangeError::PkceMismatch)
        ));

        // Verifier checks burn the code like any other mismatch.
        let code2 = mint(&pool, &mint_params(&user_id, Some(&challenge)))
            .await
            .expect("mint");
        let wrong = ExchangeRequest {
            code: &code2,
            tenant_id: "t1",
            redirect_origin: "https://store-a.centerpiece.shop",
            code_verifier: Some("wrong-verifier-entirely-wrong-and-too-long"),
        };
        assert!(matches!(
            exchange(&pool, &wrong).await,
            Err(ExchangeError::PkceMismatch)
        ));

        let code3 = mint(&pool, &mint_params(&user_id, Some(&challenge)))
            .await
            .expect("mint");
        let ok = ExchangeRequest {
            code: &code3,
            tenant_id: "t1",
            redirect_origin: "https://store-a.centerpiece.shop",
            code_verifier: Some(verifier),
        };
        assert!(exchange(&pool, &ok).await.is_ok());
    }

    #[tokio::test]
    async fn expired_codes_are_rejected() {
        let (pool, user_id) = pool_with_user().await;
        let params = MintCode {
            ttl_seconds: -5,
            ..mint_params(&user_id, None)
        };
        let code = mint(&pool, &params).await.expect("mint");
        let request = ExchangeRequest {
            code: &code,
            tenant_id: "t1",
            redirect_origin: "https://store-a.centerpiece.shop",
            code_verifier: None,
        };
        // The mint-time sweep may have already reclaimed the row; either way
        // the exchange must refuse.
        let result = exchange(&pool, &request).await;
        assert!(matches!(
            result,
            Err(ExchangeError::Expired) | Err(ExchangeError::UnknownCode)
        ));
    }
}
