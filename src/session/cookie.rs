//! The `cp_refresh` cookie on the auth origin.

use axum::http::{HeaderMap, HeaderValue, header::InvalidHeaderValue};

use crate::config::Config;

pub const REFRESH_COOKIE_NAME: &str = "cp_refresh";

/// Build the refresh cookie for a freshly issued or rotated token.
///
/// SameSite=Lax is what makes the top-level-navigation refresh work when
/// third-party cookies are blocked.
pub fn refresh_cookie(config: &Config, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.refresh_token_ttl_seconds();
    let mut cookie =
        format!("{REFRESH_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if let Some(domain) = config.cookie_domain() {
        cookie.push_str("; Domain=");
        cookie.push_str(&domain);
    }
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Clear the cookie by reissuing it with Max-Age=0.
pub fn clear_refresh_cookie(config: &Config) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{REFRESH_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if let Some(domain) = config.cookie_domain() {
        cookie.push_str("; Domain=");
        cookie.push_str(&domain);
    }
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Read the refresh token from the Cookie header, if present.
pub fn extract_refresh_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == REFRESH_COOKIE_NAME && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Environment};

    fn config() -> Config {
        Config::new(
            Environment::Production,
            "https://auth.centerpiece.app".to_string(),
        )
    }

    #[test]
    fn refresh_cookie_attributes() {
        let cookie = refresh_cookie(&config(), "tok123").expect("cookie");
        let cookie = cookie.to_str().expect("ascii");
        assert!(cookie.starts_with("cp_refresh=tok123; "));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=2592000"));
        assert!(cookie.contains("Domain=auth.centerpiece.app"));
        assert!(cookie.contains("Secure"));
    }

    #[test]
    fn dev_cookie_is_not_secure() {
        let config = Config::new(
            Environment::Development,
            "http://localhost:8080".to_string(),
        );
        let cookie = refresh_cookie(&config, "tok").expect("cookie");
        assert!(!cookie.to_str().expect("ascii").contains("Secure"));
    }

    #[test]
    fn clear_cookie_zeroes_max_age() {
        let cookie = clear_refresh_cookie(&config()).expect("cookie");
        let cookie = cookie.to_str().expect("ascii");
        assert!(cookie.starts_with("cp_refresh=; "));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn extract_finds_the_refresh_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("other=1; cp_refresh=abc123; theme=dark"),
        );
        assert_eq!(extract_refresh_token(&headers), Some("abc123".to_string()));

        let mut empty = HeaderMap::new();
        empty.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("cp_refresh="),
        );
        assert_eq!(extract_refresh_token(&empty), None);
        assert_eq!(extract_refresh_token(&HeaderMap::new()), None);
    }
}
