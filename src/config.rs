//! Runtime configuration shared across handlers and middleware.

use secrecy::SecretString;
use url::Url;

pub const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 900;
pub const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 30;
pub const DEFAULT_AUTH_CODE_TTL_SECONDS: i64 = 60;
pub const DEFAULT_OAUTH_STATE_TTL_SECONDS: i64 = 5 * 60;
pub const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;

/// Deployment environment; production tightens redirects and rate limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Production,
    Staging,
    Development,
}

impl Environment {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "staging" => Self::Staging,
            _ => Self::Development,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Development => "development",
        }
    }
}

/// Client credentials for a standard OAuth provider.
#[derive(Clone, Debug)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    /// Test hook: overrides the provider token endpoint when set.
    pub token_url: Option<String>,
    /// Test hook: overrides the provider profile endpoint when set.
    pub profile_url: Option<String>,
}

impl OAuthClientConfig {
    #[must_use]
    pub fn new(client_id: String, client_secret: SecretString) -> Self {
        Self {
            client_id,
            client_secret,
            token_url: None,
            profile_url: None,
        }
    }
}

/// Apple needs key material instead of a static secret; the client secret is
/// a short-lived JWT signed on the fly.
#[derive(Clone, Debug)]
pub struct AppleClientConfig {
    pub client_id: String,
    pub team_id: String,
    pub key_id: String,
    pub private_key_pem: SecretString,
    pub token_url: Option<String>,
}

/// Provider credential set; an unconfigured provider rejects initiation.
#[derive(Clone, Debug, Default)]
pub struct OAuthProviders {
    pub google: Option<OAuthClientConfig>,
    pub facebook: Option<OAuthClientConfig>,
    pub apple: Option<AppleClientConfig>,
    pub microsoft: Option<OAuthClientConfig>,
}

#[derive(Clone, Debug)]
pub struct Config {
    environment: Environment,
    auth_domain: String,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_days: i64,
    auth_code_ttl_seconds: i64,
    email_from: String,
    email_from_name: String,
    oauth: OAuthProviders,
}

impl Config {
    #[must_use]
    pub fn new(environment: Environment, auth_domain: String) -> Self {
        Self {
            environment,
            auth_domain: auth_domain.trim_end_matches('/').to_string(),
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_days: DEFAULT_REFRESH_TOKEN_TTL_DAYS,
            auth_code_ttl_seconds: DEFAULT_AUTH_CODE_TTL_SECONDS,
            email_from: "no-reply@centerpiecelab.com".to_string(),
            email_from_name: "Centerpiece".to_string(),
            oauth: OAuthProviders::default(),
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_days(mut self, days: i64) -> Self {
        self.refresh_token_ttl_days = days;
        self
    }

    #[must_use]
    pub fn with_auth_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.auth_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_email_from(mut self, from: String, from_name: String) -> Self {
        self.email_from = from;
        self.email_from_name = from_name;
        self
    }

    #[must_use]
    pub fn with_oauth_providers(mut self, oauth: OAuthProviders) -> Self {
        self.oauth = oauth;
        self
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Public origin of this service, also the `iss` claim of issued tokens.
    #[must_use]
    pub fn auth_domain(&self) -> &str {
        &self.auth_domain
    }

    /// Host part of the auth domain, used as the cookie Domain attribute.
    #[must_use]
    pub fn cookie_domain(&self) -> Option<String> {
        Url::parse(&self.auth_domain)
            .ok()
            .and_then(|url| url.host_str().map(ToString::to_string))
    }

    /// Cookies are Secure everywhere except plain-http dev setups.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.auth_domain.starts_with("https://")
    }

    #[must_use]
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_days * 24 * 60 * 60
    }

    #[must_use]
    pub fn auth_code_ttl_seconds(&self) -> i64 {
        self.auth_code_ttl_seconds
    }

    #[must_use]
    pub fn email_from(&self) -> &str {
        &self.email_from
    }

    #[must_use]
    pub fn email_from_name(&self) -> &str {
        &self.email_from_name
    }

    #[must_use]
    pub fn oauth(&self) -> &OAuthProviders {
        &self.oauth
    }

    /// Callback URL registered with each provider.
    #[must_use]
    pub fn oauth_callback_url(&self, provider: &str) -> String {
        format!("{}/oauth/{provider}/callback", self.auth_domain)
    }
}
