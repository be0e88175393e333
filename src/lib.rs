//! # Centerpiece Auth
//!
//! `centerpiece-auth` is the centralized identity and authorization service
//! for the Centerpiece commerce platform. Many tenant-owned storefronts share
//! one identity pool; this service is the sole authority over credentials,
//! federated sign-in, and session lifecycle.
//!
//! ## Sign-in shape
//!
//! Browsers authenticate here and leave with two things: a `cp_refresh`
//! cookie scoped to the auth origin, and a one-shot authorization code in the
//! redirect back to the tenant. The tenant backend exchanges the code
//! server-to-server for a short-lived ES256 access token; downstream services
//! verify tokens themselves against `/.well-known/jwks.json`.
//!
//! ## Session lifecycle
//!
//! Refresh tokens rotate on every use and live in families. A rotated token
//! that comes back is treated as stolen and kills its whole family. Refresh
//! happens as a top-level navigation so the SameSite=Lax cookie travels even
//! where third-party cookies are blocked.
//!
//! ## Tenancy
//!
//! Redirect URLs are the tenant authority: a validated redirect derives the
//! tenant identity, and authorization codes are bound to the (tenant, origin)
//! pair they were minted for.

pub mod api;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod jwt;
pub mod oauth;
pub mod redirect;
pub mod session;
pub mod store;

pub use api::{APP_USER_AGENT, GIT_COMMIT_HASH};
