//! HTML page endpoints.
//!
//! Branded rendering is an external collaborator; the core only fixes the
//! contract and ships a plain fallback so error redirects always have a
//! landing target.

use axum::{
    extract::{Extension, Query},
    response::Html,
};
use serde::Deserialize;
use std::sync::Arc;

/// Query parameters echoed into the page (error codes, prefills).
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Page {
    Login,
    Register,
    ResetPassword,
}

/// Rendering contract for the tenant-themed frontend.
pub trait PageRenderer: Send + Sync {
    fn render(&self, page: Page, params: &PageParams) -> String;
}

/// Unthemed fallback renderer.
#[derive(Clone, Debug, Default)]
pub struct PlainPageRenderer;

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn notice_block(params: &PageParams) -> String {
    let mut block = String::new();
    if let Some(error) = &params.error {
        block.push_str(&format!(
            "<p class=\"error\">{}</p>",
            escape_html(error)
        ));
    }
    if let Some(message) = &params.message {
        block.push_str(&format!(
            "<p class=\"message\">{}</p>",
            escape_html(message)
        ));
    }
    block
}

fn hidden_field(name: &str, value: Option<&str>) -> String {
    value.map_or_else(String::new, |value| {
        format!(
            "<input type=\"hidden\" name=\"{name}\" value=\"{}\">",
            escape_html(value)
        )
    })
}

impl PageRenderer for PlainPageRenderer {
    fn render(&self, page: Page, params: &PageParams) -> String {
        let notices = notice_block(params);
        let email = escape_html(params.email.as_deref().unwrap_or_default());
        let redirect = hidden_field("redirect", params.redirect.as_deref());
        let body = match page {
            Page::Login => format!(
                "<h1>Sign in</h1>{notices}\
                 <form method=\"post\" action=\"/api/login\">{redirect}\
                 <input name=\"email\" type=\"email\" value=\"{email}\" placeholder=\"Email\">\
                 <input name=\"password\" type=\"password\" placeholder=\"Password\">\
                 <button type=\"submit\">Sign in</button></form>\
                 <a href=\"/register\">Create an account</a>"
            ),
            Page::Register => {
                let name = escape_html(params.name.as_deref().unwrap_or_default());
                format!(
                    "<h1>Create account</h1>{notices}\
                     <form method=\"post\" action=\"/api/register\">{redirect}\
                     <input name=\"name\" value=\"{name}\" placeholder=\"Name\">\
                     <input name=\"email\" type=\"email\" value=\"{email}\" placeholder=\"Email\">\
                     <input name=\"password\" type=\"password\" placeholder=\"Password\">\
                     <input name=\"confirmPassword\" type=\"password\" placeholder=\"Confirm password\">\
                     <button type=\"submit\">Create account</button></form>"
                )
            }
            Page::ResetPassword => {
                let token = hidden_field("token", params.token.as_deref());
                format!(
                    "<h1>Reset password</h1>{notices}\
                     <form method=\"post\" action=\"/api/reset-password\">{token}\
                     <input name=\"newPassword\" type=\"password\" placeholder=\"New password\">\
                     <input name=\"confirmPassword\" type=\"password\" placeholder=\"Confirm password\">\
                     <button type=\"submit\">Reset password</button></form>"
                )
            }
        };
        format!(
            "<!doctype html><html><head><meta charset=\"utf-8\"><title>Centerpiece</title></head>\
             <body>{body}</body></html>"
        )
    }
}

pub async fn login_page(
    Extension(renderer): Extension<Arc<dyn PageRenderer>>,
    Query(params): Query<PageParams>,
) -> Html<String> {
    Html(renderer.render(Page::Login, &params))
}

pub async fn register_page(
    Extension(renderer): Extension<Arc<dyn PageRenderer>>,
    Query(params): Query<PageParams>,
) -> Html<String> {
    Html(renderer.render(Page::Register, &params))
}

pub async fn reset_password_page(
    Extension(renderer): Extension<Arc<dyn PageRenderer>>,
    Query(params): Query<PageParams>,
) -> Html<String> {
    Html(renderer.render(Page::ResetPassword, &params))
}

pub async fn root() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_escape_echoed_input() {
        let params = PageParams {
            error: Some("<script>alert(1)</script>".to_string()),
            email: Some("\"><img src=x>".to_string()),
            ..PageParams::default()
        };
        let html = PlainPageRenderer.render(Page::Login, &params);
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("\"><img"));
    }

    #[test]
    fn reset_page_embeds_token_as_hidden_field() {
        let params = PageParams {
            token: Some("tok-123".to_string()),
            ..PageParams::default()
        };
        let html = PlainPageRenderer.render(Page::ResetPassword, &params);
        assert!(html.contains("name=\"token\" value=\"tok-123\""));
        assert!(html.contains("action=\"/api/reset-password\""));
    }

    #[test]
    fn register_page_preserves_redirect() {
        let params = PageParams {
            redirect: Some("https://store-a.centerpiece.shop/cart".to_string()),
            ..PageParams::default()
        };
        let html = PlainPageRenderer.render(Page::Register, &params);
        assert!(html.contains("name=\"redirect\""));
        assert!(html.contains("store-a.centerpiece.shop"));
    }
}
