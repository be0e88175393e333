//! Structured audit lines for authentication traffic.
//!
//! Each event is one JSON object on one line. Emission must never fail the
//! request it describes.

use chrono::Utc;
use serde_json::json;
use tracing::info;

#[derive(Debug, Default)]
pub struct AuditEvent<'a> {
    pub kind: &'a str,
    pub correlation_id: &'a str,
    pub route: &'a str,
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub status_code: Option<u16>,
    pub details: Option<serde_json::Value>,
}

pub fn emit(event: &AuditEvent<'_>) {
    let mut line = json!({
        "level": "info",
        "ts": Utc::now().to_rfc3339(),
        "correlationId": event.correlation_id,
        "event": format!("auth.audit.{}", event.kind),
        "ip": event.ip,
        "route": event.route,
        "userAgent": event.user_agent,
    });
    if let Some(user_id) = event.user_id {
        line["userId"] = json!(user_id);
    }
    if let Some(status) = event.status_code {
        line["statusCode"] = json!(status);
    }
    if let Some(details) = &event.details {
        line["details"] = details.clone();
    }

    if let Ok(serialized) = serde_json::to_string(&line) {
        info!(target: "auth.audit", "{serialized}");
    }
}

/// Event kind for a route: the last path segment, or the whole path.
#[must_use]
pub fn kind_for_route(route: &str) -> &str {
    route
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("request")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_for_route_takes_last_segment() {
        assert_eq!(kind_for_route("/api/login"), "login");
        assert_eq!(kind_for_route("/oauth/google/callback"), "callback");
        assert_eq!(kind_for_route("/api/logout-all"), "logout-all");
        assert_eq!(kind_for_route("/"), "request");
    }

    #[test]
    fn emit_does_not_panic_on_minimal_event() {
        emit(&AuditEvent {
            kind: "login",
            correlation_id: "corr-1",
            route: "/api/login",
            ..AuditEvent::default()
        });
        emit(&AuditEvent {
            kind: "token",
            correlation_id: "corr-2",
            route: "/api/token",
            ip: Some("203.0.113.7"),
            user_agent: Some("curl/8"),
            user_id: Some("user-1"),
            status_code: Some(200),
            details: Some(serde_json::json!({"aud": "storefront"})),
        });
    }
}
