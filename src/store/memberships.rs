//! Tenant membership rows: (user, tenant, role) with a status.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use super::query_span;

pub const ROLE_CUSTOMER: &str = "customer";
pub const STATUS_ACTIVE: &str = "active";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Membership {
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    pub role: String,
    pub status: String,
}

/// Insert an active customer membership, or do nothing if the
/// (user, tenant, role) row already exists.
///
/// Only the customer role may be auto-created; other roles come from
/// administrative tooling. Existing rows keep their status, including
/// `invited` and `suspended`.
pub async fn ensure_membership(pool: &SqlitePool, user_id: &str, tenant_id: &str) -> Result<()> {
    let query = r"
        INSERT INTO tenant_memberships (id, user_id, tenant_id, role, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (user_id, tenant_id, role) DO NOTHING
    ";
    let span = query_span("INSERT", query);
    sqlx::query(query)
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(tenant_id)
        .bind(ROLE_CUSTOMER)
        .bind(STATUS_ACTIVE)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to ensure membership")?;
    Ok(())
}

pub async fn list_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Membership>> {
    let query = r"
        SELECT tenant_id, role, status
        FROM tenant_memberships
        WHERE user_id = $1
        ORDER BY created_at ASC
    ";
    let span = query_span("SELECT", query);
    let rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list memberships")?;

    Ok(rows
        .iter()
        .map(|row| Membership {
            tenant_id: row.get("tenant_id"),
            role: row.get("role"),
            status: row.get("status"),
        })
        .collect())
}

/// Admin-token context: the oldest active non-customer membership decides
/// the primary tenant, and the roles are everything held there.
pub async fn primary_admin_context(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Option<(String, Vec<String>)>> {
    let query = r"
        SELECT tenant_id
        FROM tenant_memberships
        WHERE user_id = $1 AND status = 'active' AND role != 'customer'
        ORDER BY created_at ASC
        LIMIT 1
    ";
    let span = query_span("SELECT", query);
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to find primary tenant")?;

    let Some(row) = row else {
        return Ok(None);
    };
    let tenant_id: String = row.get("tenant_id");

    let query = r"
        SELECT role
        FROM tenant_memberships
        WHERE user_id = $1 AND tenant_id = $2 AND status = 'active'
        ORDER BY created_at ASC
    ";
    let span = query_span("SELECT", query);
    let rows = sqlx::query(query)
        .bind(user_id)
        .bind(&tenant_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list roles for primary tenant")?;

    let roles = rows.iter().map(|row| row.get("role")).collect();
    Ok(Some((tenant_id, roles)))
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
                email: "member@test.shop",
                email_verified: true,
                password_hash: None,
                name: "Member",
                avatar_url: None,
            },
        )
        .await
        .expect("user") else {
            panic!("expected created");
        };
        (pool, user.id)
    }

    async fn insert_role(pool: &SqlitePool, user_id: &str, tenant: &str, role: &str, status: &str, created_at: &str) {
        sqlx::query(
            "INSERT INTO tenant_memberships (id, user_id, tenant_id, role, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(tenant)
        .bind(role)
        .bind(status)
        .bind(created_at)
        .execute(pool)
        .await
        .expect("insert role");
    }

    #[tokio::test]
    async fn ensure_membership_is_idempotent() {
        let (pool, user_id) = pool_with_user().await;
        ensure_membership(&pool, &user_id, "t1").await.expect("first");
        ensure_membership(&pool, &user_id, "t1").await.expect("second");

        let memberships = list_for_user(&pool, &user_id).await.expect("list");
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].role, ROLE_CUSTOMER);
        assert_eq!(memberships[0].status, STATUS_ACTIVE);
    }

    #[tokio::test]
    async fn ensure_membership_keeps_existing_status() {
        let (pool, user_id) = pool_with_user().await;
        insert_role(&pool, &user_id, "t1", "customer", "invited", "2026-01-01T00:00:00Z").await;

        ensure_membership(&pool, &user_id, "t1").await.expect("ensure");
        let memberships = list_for_user(&pool, &user_id).await.expect("list");
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].status, "invited");
    }

    #[tokio::test]
    async fn primary_admin_context_picks_oldest_non_customer() {
        let (pool, user_id) = pool_with_user().await;
        ensure_membership(&pool, &user_id, "t1").await.expect("customer");
        insert_role(&pool, &user_id, "t3", "seller", "active", "2026-02-01T00:00:00Z").await;
        insert_role(&pool, &user_id, "t2", "supplier", "active", "2026-01-01T00:00:00Z").await;
        insert_role(&pool, &user_id, "t4", "seller", "suspended", "2025-01-01T00:00:00Z").await;

        let (tenant, roles) = primary_admin_context(&pool, &user_id)
            .await
            .expect("query")
            .expect("present");
        assert_eq!(tenant, "t2");
        assert_eq!(roles, vec!["supplier".to_string()]);
    }

    #[tokio::test]
    async fn primary_admin_context_none_for_customer_only() {
        let (pool, user_id) = pool_with_user().await;
        ensure_membership(&pool, &user_id, "t1").await.expect("customer");
        assert!(
            primary_admin_context(&pool, &user_id)
                .await
                .expect("query")
                .is_none()
        );
    }
}
