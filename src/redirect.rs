//! Redirect URL validation and tenant derivation.
//!
//! Every flow that accepts a `redirect` parameter runs it through
//! [`validate_redirect`] before anything else. The validator is the only
//! authority on which origins may receive authorization codes, and the tenant
//! identity it derives overrides any tenant hint in the request body.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use url::{Host, Url};

use crate::config::Environment;

/// Domain tails accepted without a per-tenant registration lookup.
pub const CONTROLLED_SUFFIXES: [&str; 6] = [
    ".centerpiece.shop",
    ".centerpiece.app",
    ".centerpiece.io",
    ".centerpiecelab.com",
    ".workers.dev",
    ".pages.dev",
];

/// Tenant id used when a controlled-suffix host has no domain registration.
pub const UNKNOWN_TENANT: &str = "__unknown__";

/// Single abstract rejection; callers map it to the user-visible
/// `invalid_redirect` code without leaking which rule fired.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("redirect url rejected")]
pub struct InvalidRedirect;

/// Outcome of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRedirect {
    /// Scheme plus authority, serialized the way the URL parser prints it.
    pub origin: String,
    /// Authoritative tenant id, `__unknown__` when only the suffix matched.
    pub tenant_id: String,
    /// Path and query of the candidate, echoed back as `returnTo`.
    pub return_to: String,
}

/// Registered tenant domain record, as returned by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantDomain {
    pub id: String,
}

/// Lookup surface for tenant domain registrations.
///
/// Backed by the platform KV namespace in production, keyed as
/// `domain:<host>`. The core only needs reads.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn lookup_domain(&self, host: &str) -> anyhow::Result<Option<TenantDomain>>;
}

/// Directory with no registrations; controlled suffixes still validate.
#[derive(Debug, Clone, Default)]
pub struct NoopTenantDirectory;

#[async_trait]
impl TenantDirectory for NoopTenantDirectory {
    async fn lookup_domain(&self, _host: &str) -> anyhow::Result<Option<TenantDomain>> {
        Ok(None)
    }
}

/// Fixed host-to-tenant map, used by tests and single-tenant deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticTenantDirectory {
    domains: HashMap<String, String>,
}

impl StaticTenantDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_domain(mut self, host: &str, tenant_id: &str) -> Self {
        self.domains.insert(host.to_string(), tenant_id.to_string());
        self
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn lookup_domain(&self, host: &str) -> anyhow::Result<Option<TenantDomain>> {
        Ok(self
            .domains
            .get(host)
            .map(|id| TenantDomain { id: id.clone() }))
    }
}

/// Classify a candidate redirect URL and derive the tenant it belongs to.
///
/// Rules run in a fixed order; the first violation rejects. A directory
/// lookup failure also rejects, since an unverifiable host must not receive
/// codes.
pub async fn validate_redirect(
    candidate: &str,
    environment: Environment,
    directory: &dyn TenantDirectory,
) -> Result<ValidatedRedirect, InvalidRedirect> {
    let url = Url::parse(candidate).map_err(|_| InvalidRedirect)?;

    let host = url.host().ok_or(InvalidRedirect)?;
    let host_str = host.to_string();
    let dev_localhost = environment != Environment::Production
        && (host_str == "localhost" || host_str == "127.0.0.1");

    match url.scheme() {
        "javascript" => return Err(InvalidRedirect),
        "https" => {}
        "http" if dev_localhost => {}
        _ => return Err(InvalidRedirect),
    }

    // IP-literal hosts never belong to tenants; the only IP ever accepted is
    // the dev loopback, and that one only over plain http.
    match host {
        Host::Domain(_) => {}
        Host::Ipv4(_) | Host::Ipv6(_) => {
            if !(dev_localhost && url.scheme() == "http") {
                return Err(InvalidRedirect);
            }
        }
    }

    if url.fragment().is_some() {
        return Err(InvalidRedirect);
    }

    let suffix_match = CONTROLLED_SUFFIXES
        .iter()
        .any(|suffix| host_str.ends_with(suffix));
    let registered = directory
        .lookup_domain(&host_str)
        .await
        .map_err(|_| InvalidRedirect)?;

    let tenant_id = match (registered, suffix_match, dev_localhost) {
        (Some(domain), _, _) => domain.id,
        (None, true, _) | (None, _, true) => UNKNOWN_TENANT.to_string(),
        (None, false, false) => return Err(InvalidRedirect),
    };

    let return_to = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };

    Ok(ValidatedRedirect {
        origin: url.origin().ascii_serialization(),
        tenant_id,
        return_to,
    })
}
