pub mod jwt;
pub mod logging;
pub mod oauth;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("centerpiece-auth")
        .about("Identity and authorization service for Centerpiece storefronts")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("AUTH_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("SQLite database path or URL")
                .default_value("sqlite://centerpiece-auth.db")
                .env("AUTH_DSN"),
        )
        .arg(
            Arg::new("environment")
                .long("environment")
                .help("Deployment environment: production, staging, or development")
                .default_value("development")
                .env("ENVIRONMENT"),
        )
        .arg(
            Arg::new("auth-domain")
                .long("auth-domain")
                .help("Public origin of this service, also the token issuer")
                .env("AUTH_DOMAIN")
                .required(true),
        )
        .arg(
            Arg::new("access-token-ttl-seconds")
                .long("access-token-ttl-seconds")
                .help("Access token lifetime in seconds")
                .default_value("900")
                .env("ACCESS_TOKEN_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("refresh-token-ttl-days")
                .long("refresh-token-ttl-days")
                .help("Refresh token lifetime in days")
                .default_value("30")
                .env("REFRESH_TOKEN_TTL_DAYS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("auth-code-ttl-seconds")
                .long("auth-code-ttl-seconds")
                .help("Authorization code lifetime in seconds")
                .default_value("60")
                .env("AUTH_CODE_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("email-from")
                .long("email-from")
                .help("From address for outgoing notifications")
                .default_value("no-reply@centerpiecelab.com")
                .env("EMAIL_FROM"),
        )
        .arg(
            Arg::new("email-from-name")
                .long("email-from-name")
                .help("From display name for outgoing notifications")
                .default_value("Centerpiece")
                .env("EMAIL_FROM_NAME"),
        );

    let command = jwt::with_args(command);
    let command = oauth::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();
        assert_eq!(command.get_name(), "centerpiece-auth");
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults_and_required_args() {
        temp_env::with_vars(
            [
                ("AUTH_DOMAIN", Some("https://auth.centerpiece.app")),
                ("JWT_PRIVATE_KEY", Some("private-pem")),
                ("JWT_PUBLIC_KEY", Some("public-pem")),
                ("ENVIRONMENT", None),
                ("AUTH_PORT", None),
                ("ACCESS_TOKEN_TTL_SECONDS", None),
            ],
            || {
                let matches = new().get_matches_from(vec!["centerpiece-auth"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));
                assert_eq!(
                    matches.get_one::<String>("environment").map(String::as_str),
                    Some("development")
                );
                assert_eq!(
                    matches.get_one::<i64>("access-token-ttl-seconds").copied(),
                    Some(900)
                );
                assert_eq!(
                    matches.get_one::<i64>("refresh-token-ttl-days").copied(),
                    Some(30)
                );
                assert_eq!(
                    matches.get_one::<i64>("auth-code-ttl-seconds").copied(),
                    Some(60)
                );
            },
        );
    }

    #[test]
    fn test_env_overrides() {
        temp_env::with_vars(
            [
                ("AUTH_DOMAIN", Some("https://auth.staging.centerpiece.app")),
                ("JWT_PRIVATE_KEY", Some("private-pem")),
                ("JWT_PUBLIC_KEY", Some("public-pem")),
                ("ENVIRONMENT", Some("staging")),
                ("AUTH_PORT", Some("9443")),
                ("ACCESS_TOKEN_TTL_SECONDS", Some("600")),
            ],
            || {
                let matches = new().get_matches_from(vec!["centerpiece-auth"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(9443));
                assert_eq!(
                    matches.get_one::<String>("environment").map(String::as_str),
                    Some("staging")
                );
                assert_eq!(
                    matches.get_one::<i64>("access-token-ttl-seconds").copied(),
                    Some(600)
                );
            },
        );
    }

    #[test]
    fn test_missing_jwt_keys_fail() {
        temp_env::with_vars(
            [
                ("AUTH_DOMAIN", Some("https://auth.centerpiece.app")),
                ("JWT_PRIVATE_KEY", None::<&str>),
                ("JWT_PUBLIC_KEY", None),
            ],
            || {
                let result = new().try_get_matches_from(vec!["centerpiece-auth"]);
                assert!(result.is_err(), "jwt keys are required");
            },
        );
    }
}
