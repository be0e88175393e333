use super::handlers::{health, jwks, login, logout, memberships, password, refresh, register, token};
use utoipa::openapi::{InfoBuilder, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and documented. HTML pages and the federation endpoints are wired outside
/// and intentionally undocumented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(jwks::jwks_document))
        .routes(routes!(register::register))
        .routes(routes!(login::login))
        .routes(routes!(password::forgot_password))
        .routes(routes!(password::reset_password))
        .routes(routes!(token::token))
        .routes(routes!(refresh::refresh))
        .routes(routes!(logout::logout))
        .routes(routes!(logout::logout_all))
        .routes(routes!(memberships::memberships));

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Credential, session, and federation flows".to_string());

    let mut system_tag = Tag::new("system");
    system_tag.description = Some("Health and key discovery".to_string());

    router.get_openapi_mut().tags = Some(vec![auth_tag, system_tag]);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")))
        .build();
    OpenApiBuilder::new().info(info).build()
}
