//! Shared harness: in-memory database, runtime keypair, request helpers.
#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use http_body_util::BodyExt;
use p256::SecretKey;
use p256::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;

use centerpiece_auth::api::{Dependencies, router};
use centerpiece_auth::config::{Config, Environment};
use centerpiece_auth::jwt::JwtKeys;
use centerpiece_auth::store;

/// Fresh P-256 keypair as (private, public) PEM strings.
pub fn generate_keypair() -> (String, String) {
    let secret = SecretKey::random(&mut rand::rngs::OsRng);
    let private_pem = secret
        .to_pkcs8_pem(LineEnding::LF)
        .expect("private pem")
        .to_string();
    let public_pem = secret
        .public_key()
        .to_public_key_pem(LineEnding::LF)
        .expect("public pem");
    (private_pem, public_pem)
}

pub fn production_config() -> Config {
    Config::new(
        Environment::Production,
        "https://auth.centerpiece.app".to_string(),
    )
}

pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
    pub keys: Arc<JwtKeys>,
}

/// Build a router over an in-memory database, with optional tweaks to the
/// dependency set before it is frozen into the router.
pub async fn test_app_with(
    config: Config,
    customize: impl FnOnce(Dependencies) -> Dependencies,
) -> TestApp {
    let pool = store::connect_in_memory().await.expect("pool");
    store::migrate(&pool).await.expect("migrate");

    let (private_pem, public_pem) = generate_keypair();
    let keys = JwtKeys::from_pem(&private_pem, &public_pem).expect("keys");
    let verify_keys = Arc::new(JwtKeys::from_pem(&private_pem, &public_pem).expect("keys"));

    let deps = customize(Dependencies::new(pool.clone(), config, keys));
    TestApp {
        app: router(deps),
        pool,
        keys: verify_keys,
    }
}

pub async fn test_app(config: Config) -> TestApp {
    test_app_with(config, |deps| deps).await
}

pub fn form_request(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        )
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn json_request(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn get_request(path: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .expect("request")
}

pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location header")
        .to_string()
}

pub fn set_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .expect("set-cookie header")
        .to_string()
}

/// Extract the cookie value from a Set-Cookie header line.
pub fn cookie_value(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value.to_string())
        .expect("cookie value")
}

/// Extract one query parameter from a URL string.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.to_string())
}

/// Decode the payload segment of a compact JWS without verifying it.
pub fn jwt_payload(token: &str) -> Value {
    use base64::Engine;
    let payload = token.split('.').nth(1).expect("payload segment");
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .expect("payload base64");
    serde_json::from_slice(&bytes).expect("payload json")
}
