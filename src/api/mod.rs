//! HTTP surface: router, middleware stack, and server lifecycle.

use anyhow::{Context, Result};
use axum::{
    Extension,
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware,
    routing::get,
};
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{Span, info, info_span};

use crate::api::handlers::pages::{PageRenderer, PlainPageRenderer};
use crate::api::rate_limit::{RateLimiter, WindowRateLimiter};
use crate::config::Config;
use crate::jwt::JwtKeys;
use crate::redirect::{NoopTenantDirectory, TenantDirectory};

pub(crate) mod audit;
pub(crate) mod cors;
pub mod email;
pub mod handlers;
pub mod rate_limit;
pub mod trace;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use openapi::openapi;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Everything the router needs; collaborators default to their local
/// implementations and can be swapped per deployment or test.
pub struct Dependencies {
    pool: SqlitePool,
    config: Arc<Config>,
    keys: Arc<JwtKeys>,
    limiter: Arc<dyn RateLimiter>,
    mailer: Arc<dyn email::EmailSender>,
    directory: Arc<dyn TenantDirectory>,
    renderer: Arc<dyn PageRenderer>,
    http: reqwest::Client,
}

impl Dependencies {
    /// Provider calls get a bounded deadline; a hung endpoint must not pin
    /// a callback request.
    pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

    #[must_use]
    pub fn new(pool: SqlitePool, config: Config, keys: JwtKeys) -> Self {
        let limiter = WindowRateLimiter::for_config(&config);
        let http = reqwest::Client::builder()
            .timeout(Self::PROVIDER_TIMEOUT)
            .user_agent(APP_USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            pool,
            config: Arc::new(config),
            keys: Arc::new(keys),
            limiter: Arc::new(limiter),
            mailer: Arc::new(email::LogEmailSender),
            directory: Arc::new(NoopTenantDirectory),
            renderer: Arc::new(PlainPageRenderer),
            http,
        }
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn with_email_sender(mut self, mailer: Arc<dyn email::EmailSender>) -> Self {
        self.mailer = mailer;
        self
    }

    #[must_use]
    pub fn with_tenant_directory(mut self, directory: Arc<dyn TenantDirectory>) -> Self {
        self.directory = directory;
        self
    }

    #[must_use]
    pub fn with_page_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = renderer;
        self
    }
}

/// Build the full application router with the middleware stack attached.
#[must_use]
pub fn router(deps: Dependencies) -> axum::Router {
    let (router, _openapi) = openapi::api_router().split_for_parts();

    router
        .route("/", get(handlers::pages::root))
        .route("/login", get(handlers::pages::login_page))
        .route("/register", get(handlers::pages::register_page))
        .route("/reset-password", get(handlers::pages::reset_password_page))
        .route("/oauth/{provider}", get(handlers::oauth::init))
        .route(
            "/oauth/{provider}/callback",
            get(handlers::oauth::callback_get).post(handlers::oauth::callback_post),
        )
        .layer(
            ServiceBuilder::new()
                .layer(Extension(deps.pool))
                .layer(Extension(deps.config))
                .layer(Extension(deps.keys))
                .layer(Extension(deps.limiter))
                .layer(Extension(deps.mailer))
                .layer(Extension(deps.directory))
                .layer(Extension(deps.renderer))
                .layer(Extension(deps.http))
                .layer(middleware::from_fn(trace::middleware))
                .layer(middleware::from_fn(cors::middleware))
                .layer(middleware::from_fn(rate_limit::middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
}

/// Bind and serve until ctrl-c.
pub async fn serve(port: u16, deps: Dependencies) -> Result<()> {
    let app = router(deps);
    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;

    info!("Listening on [::]:{port}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutting down");
        })
        .await
        .context("server error")
}

fn make_span(request: &Request<Body>) -> Span {
    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .or_else(|| request.headers().get("x-request-id"))
        .and_then(|value| value.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        correlation_id
    )
}
