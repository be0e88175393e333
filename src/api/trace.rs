//! Correlation ids, response timing, security headers, and audit emission.

use axum::{
    extract::Request,
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use ulid::Ulid;

use super::audit::{self, AuditEvent};
use super::handlers::client_ip;

/// Correlation id for the current request, stored in request extensions.
#[derive(Clone, Debug)]
pub struct CorrelationId(pub String);

const CSP: &str = "default-src 'self'; style-src 'self' 'unsafe-inline'; \
                   script-src 'self' 'unsafe-inline'; img-src 'self' https:; \
                   frame-ancestors 'none'; form-action 'self'; base-uri 'self'";

fn correlation_id_from(request: &Request) -> String {
    for name in ["x-correlation-id", "x-request-id"] {
        if let Some(value) = request.headers().get(name).and_then(|v| v.to_str().ok()) {
            let trimmed = value.trim();
            if !trimmed.is_empty() && trimmed.len() <= 128 {
                return trimmed.to_string();
            }
        }
    }
    Ulid::new().to_string()
}

fn set_if_absent(response: &mut Response, name: header::HeaderName, value: &'static str) {
    if !response.headers().contains_key(&name) {
        response
            .headers_mut()
            .insert(name, HeaderValue::from_static(value));
    }
}

pub async fn middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = correlation_id_from(&request);
    request
        .extensions_mut()
        .insert(CorrelationId(correlation_id.clone()));

    let route = request.uri().path().to_string();
    let ip = client_ip(request.headers());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);

    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        headers.insert("x-trace-id", value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("app;dur={elapsed_ms:.1}")) {
        headers.insert("server-timing", value);
    }

    set_if_absent(&mut response, header::X_FRAME_OPTIONS, "DENY");
    set_if_absent(&mut response, header::X_CONTENT_TYPE_OPTIONS, "nosniff");
    set_if_absent(
        &mut response,
        header::REFERRER_POLICY,
        "strict-origin-when-cross-origin",
    );
    if !response.headers().contains_key("permissions-policy") {
        response.headers_mut().insert(
            "permissions-policy",
            HeaderValue::from_static("camera=(), microphone=(), geolocation=(), payment=()"),
        );
    }

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"));
    if is_html && !response.headers().contains_key(header::CONTENT_SECURITY_POLICY) {
        response.headers_mut().insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CSP),
        );
    }

    if route.starts_with("/api/") || route.starts_with("/oauth/") {
        audit::emit(&AuditEvent {
            kind: audit::kind_for_route(&route),
            correlation_id: &correlation_id,
            route: &route,
            ip: ip.as_deref(),
            user_agent: user_agent.as_deref(),
            user_id: None,
            status_code: Some(response.status().as_u16()),
            details: None,
        });
    }

    response
}
