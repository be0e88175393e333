//! Liveness probe with a data-store check.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode, header::CACHE_CONTROL},
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::time::Instant;
use tracing::error;
use utoipa::ToSchema;

use crate::api::built_info;
use crate::api::trace::CorrelationId;
use crate::config::Config;
use std::sync::Arc;

#[derive(Serialize, ToSchema, Debug)]
pub struct Health {
    status: String,
    version: String,
    env: String,
    #[serde(rename = "deployedAt")]
    deployed_at: String,
    subsystems: serde_json::Value,
    #[serde(rename = "durationMs")]
    duration_ms: f64,
    #[serde(rename = "correlationId")]
    correlation_id: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and data store are healthy", body = Health),
        (status = 503, description = "Data store probe failed", body = Health)
    ),
    tag = "system"
)]
pub async fn health(
    Extension(pool): Extension<SqlitePool>,
    Extension(config): Extension<Arc<Config>>,
    correlation: Option<Extension<CorrelationId>>,
) -> impl IntoResponse {
    let started = Instant::now();

    let database_ok = match sqlx::query("SELECT 1").fetch_one(&pool).await {
        Ok(_) => true,
        Err(err) => {
            error!("health probe failed: {err}");
            false
        }
    };

    let health = Health {
        status: if database_ok { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        env: config.environment().as_str().to_string(),
        deployed_at: built_info::BUILT_TIME_UTC.to_string(),
        subsystems: json!({
            "database": if database_ok { "ok" } else { "error" },
        }),
        duration_ms: started.elapsed().as_secs_f64() * 1_000.0,
        correlation_id: correlation.map(|Extension(id)| id.0).unwrap_or_default(),
    };

    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, headers, Json(health))
}
