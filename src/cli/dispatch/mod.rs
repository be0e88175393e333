use anyhow::{Context, Result};
use secrecy::SecretString;

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{jwt, oauth};
use crate::config::{Config, Environment};

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let environment = Environment::parse(
        matches
            .get_one::<String>("environment")
            .map_or("development", String::as_str),
    );
    let auth_domain = matches
        .get_one::<String>("auth-domain")
        .cloned()
        .context("missing required argument: --auth-domain")?;

    let mut config = Config::new(environment, auth_domain);
    if let Some(ttl) = matches.get_one::<i64>("access-token-ttl-seconds") {
        config = config.with_access_token_ttl_seconds(*ttl);
    }
    if let Some(days) = matches.get_one::<i64>("refresh-token-ttl-days") {
        config = config.with_refresh_token_ttl_days(*days);
    }
    if let Some(ttl) = matches.get_one::<i64>("auth-code-ttl-seconds") {
        config = config.with_auth_code_ttl_seconds(*ttl);
    }
    if let (Some(from), Some(from_name)) = (
        matches.get_one::<String>("email-from"),
        matches.get_one::<String>("email-from-name"),
    ) {
        config = config.with_email_from(from.clone(), from_name.clone());
    }
    config = config.with_oauth_providers(oauth::from_matches(matches));

    let jwt_private_key = matches
        .get_one::<String>(jwt::ARG_JWT_PRIVATE_KEY)
        .cloned()
        .context("missing required argument: --jwt-private-key")?;
    let jwt_public_key = matches
        .get_one::<String>(jwt::ARG_JWT_PUBLIC_KEY)
        .cloned()
        .context("missing required argument: --jwt-public-key")?;

    Ok(Action::Server(Box::new(Args {
        port,
        dsn,
        config,
        jwt_private_key: SecretString::from(jwt_private_key),
        jwt_public_key,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn handler_builds_server_action() {
        temp_env::with_vars(
            [
                ("AUTH_DOMAIN", Some("https://auth.centerpiece.app")),
                ("JWT_PRIVATE_KEY", Some("private-pem")),
                ("JWT_PUBLIC_KEY", Some("public-pem")),
                ("ENVIRONMENT", Some("production")),
                ("REFRESH_TOKEN_TTL_DAYS", Some("7")),
            ],
            || {
                let matches = commands::new().get_matches_from(vec!["centerpiece-auth"]);
                let action = handler(&matches).expect("action");
                let Action::Server(args) = action;
                assert_eq!(args.port, 8080);
                assert!(args.config.is_production());
                assert_eq!(args.config.refresh_token_ttl_seconds(), 7 * 24 * 60 * 60);
                assert_eq!(args.config.auth_domain(), "https://auth.centerpiece.app");
            },
        );
    }
}
