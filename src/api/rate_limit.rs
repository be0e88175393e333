//! Per-IP, per-route rate limiting for auth endpoints.

use axum::{
    Json,
    extract::{Extension, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

use super::handlers::client_ip;
use crate::config::Config;

/// 15-minute windows, floored.
const WINDOW_SECONDS: i64 = 15 * 60;

pub const PRODUCTION_CAP: u32 = 10;
pub const DEFAULT_CAP: u32 = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check(&self, ip: &str, route: &str) -> RateLimitDecision;
}

/// Limiter that never limits; used by tests and single-user dev setups.
#[derive(Clone, Debug, Default)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _ip: &str, _route: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

/// Windowed in-process counters.
///
/// Counter storage trouble fails open: unauthenticated traffic is better
/// served than strictly limited when the store misbehaves.
pub struct WindowRateLimiter {
    cap: u32,
    counters: Mutex<HashMap<(String, String, i64), u32>>,
}

impl WindowRateLimiter {
    #[must_use]
    pub fn new(cap: u32) -> Self {
        Self {
            cap,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Cap from the deployment environment.
    #[must_use]
    pub fn for_config(config: &Config) -> Self {
        let cap = if config.is_production() {
            PRODUCTION_CAP
        } else {
            DEFAULT_CAP
        };
        Self::new(cap)
    }
}

impl RateLimiter for WindowRateLimiter {
    fn check(&self, ip: &str, route: &str) -> RateLimitDecision {
        let window = Utc::now().timestamp() / WINDOW_SECONDS;
        let Ok(mut counters) = self.counters.lock() else {
            warn!("rate limit counters unavailable, allowing request");
            return RateLimitDecision::Allowed;
        };

        // Drop stale windows once the map grows; correctness only needs the
        // current window.
        if counters.len() > 10_000 {
            counters.retain(|(_, _, w), _| *w == window);
        }

        let count = counters
            .entry((ip.to_string(), route.to_string(), window))
            .or_insert(0);
        *count += 1;
        if *count > self.cap {
            RateLimitDecision::Limited
        } else {
            RateLimitDecision::Allowed
        }
    }
}

/// Middleware gating the `/api` and `/oauth` route groups.
pub async fn middleware(
    Extension(limiter): Extension<Arc<dyn RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if path.starts_with("/api/") || path.starts_with("/oauth/") {
        let ip = client_ip(request.headers()).unwrap_or_else(|| "unknown".to_string());
        if limiter.check(&ip, &path) == RateLimitDecision::Limited {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": "Too many requests"})),
            )
                .into_response();
        }
    }
    next.run(request).await
}
