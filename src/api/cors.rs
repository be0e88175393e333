//! CORS for tenant frontends on the controlled suffixes.
//!
//! Preflights answer 204. Unknown origins get no allow header at all, and a
//! wildcard is never combined with credentials.

use axum::{
    extract::Request,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::Response,
};
use url::Url;

use crate::redirect::CONTROLLED_SUFFIXES;

fn origin_allowed(origin: &str) -> bool {
    let Ok(url) = Url::parse(origin) else {
        return false;
    };
    if url.scheme() != "https" && url.scheme() != "http" {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    CONTROLLED_SUFFIXES
        .iter()
        .any(|suffix| host.ends_with(suffix))
}

fn apply_allow_headers(response: &mut Response, origin: &HeaderValue) {
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
}

pub async fn middleware(request: Request, next: Next) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();
    let allowed = origin
        .as_ref()
        .and_then(|value| value.to_str().ok())
        .is_some_and(origin_allowed);

    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        response
            .headers_mut()
            .insert(header::VARY, HeaderValue::from_static("Origin"));
        if allowed {
            if let Some(origin) = origin {
                apply_allow_headers(&mut response, &origin);
            }
            let headers = response.headers_mut();
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("GET, POST, OPTIONS"),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("content-type, authorization"),
            );
            headers.insert(
                header::ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from_static("600"),
            );
        }
        return response;
    }

    let mut response = next.run(request).await;
    if allowed {
        if let Some(origin) = origin {
            apply_allow_headers(&mut response, &origin);
        }
    }
    response
}
