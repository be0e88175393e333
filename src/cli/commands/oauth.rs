//! Federation provider credentials. A provider missing its arguments is
//! simply disabled; initiation then redirects with `oauth_not_configured`.

use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::config::{AppleClientConfig, OAuthClientConfig, OAuthProviders};

fn secret_arg(name: &'static str, env: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .help(help)
        .env(env)
        .hide_env_values(true)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("google-client-id")
                .long("google-client-id")
                .help("Google OAuth client id")
                .env("GOOGLE_CLIENT_ID"),
        )
        .arg(secret_arg(
            "google-client-secret",
            "GOOGLE_CLIENT_SECRET",
            "Google OAuth client secret",
        ))
        .arg(
            Arg::new("facebook-client-id")
                .long("facebook-client-id")
                .help("Facebook app id")
                .env("FACEBOOK_CLIENT_ID"),
        )
        .arg(secret_arg(
            "facebook-client-secret",
            "FACEBOOK_CLIENT_SECRET",
            "Facebook app secret",
        ))
        .arg(
            Arg::new("microsoft-client-id")
                .long("microsoft-client-id")
                .help("Microsoft application id")
                .env("MICROSOFT_CLIENT_ID"),
        )
        .arg(secret_arg(
            "microsoft-client-secret",
            "MICROSOFT_CLIENT_SECRET",
            "Microsoft client secret",
        ))
        .arg(
            Arg::new("apple-client-id")
                .long("apple-client-id")
                .help("Apple services id")
                .env("APPLE_CLIENT_ID"),
        )
        .arg(
            Arg::new("apple-team-id")
                .long("apple-team-id")
                .help("Apple developer team id")
                .env("APPLE_TEAM_ID"),
        )
        .arg(
            Arg::new("apple-key-id")
                .long("apple-key-id")
                .help("Apple signing key id")
                .env("APPLE_KEY_ID"),
        )
        .arg(secret_arg(
            "apple-private-key",
            "APPLE_PRIVATE_KEY",
            "Apple ES256 private key, PEM",
        ))
}

fn client_config(matches: &ArgMatches, id_arg: &str, secret_arg: &str) -> Option<OAuthClientConfig> {
    let client_id = matches.get_one::<String>(id_arg)?.clone();
    let client_secret = matches.get_one::<String>(secret_arg)?.clone();
    Some(OAuthClientConfig::new(
        client_id,
        SecretString::from(client_secret),
    ))
}

fn apple_config(matches: &ArgMatches) -> Option<AppleClientConfig> {
    Some(AppleClientConfig {
        client_id: matches.get_one::<String>("apple-client-id")?.clone(),
        team_id: matches.get_one::<String>("apple-team-id")?.clone(),
        key_id: matches.get_one::<String>("apple-key-id")?.clone(),
        private_key_pem: SecretString::from(
            matches.get_one::<String>("apple-private-key")?.clone(),
        ),
        token_url: None,
    })
}

#[must_use]
pub fn from_matches(matches: &ArgMatches) -> OAuthProviders {
    OAuthProviders {
        google: client_config(matches, "google-client-id", "google-client-secret"),
        facebook: client_config(matches, "facebook-client-id", "facebook-client-secret"),
        apple: apple_config(matches),
        microsoft: client_config(matches, "microsoft-client-id", "microsoft-client-secret"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> Command {
        with_args(Command::new("test"))
    }

    #[test]
    fn providers_require_both_id_and_secret() {
        temp_env::with_vars(
            [
                ("GOOGLE_CLIENT_ID", Some("google-id")),
                ("GOOGLE_CLIENT_SECRET", Some("google-secret")),
                ("FACEBOOK_CLIENT_ID", Some("fb-id")),
                ("FACEBOOK_CLIENT_SECRET", None::<&str>),
                ("MICROSOFT_CLIENT_ID", None),
                ("MICROSOFT_CLIENT_SECRET", None),
                ("APPLE_CLIENT_ID", None),
                ("APPLE_TEAM_ID", None),
                ("APPLE_KEY_ID", None),
                ("APPLE_PRIVATE_KEY", None),
            ],
            || {
                let matches = command().get_matches_from(vec!["test"]);
                let providers = from_matches(&matches);
                assert!(providers.google.is_some());
                assert!(providers.facebook.is_none(), "secret missing");
                assert!(providers.microsoft.is_none());
                assert!(providers.apple.is_none());
            },
        );
    }

    #[test]
    fn apple_requires_all_four_values() {
        temp_env::with_vars(
            [
                ("APPLE_CLIENT_ID", Some("shop.centerpiece.signin")),
                ("APPLE_TEAM_ID", Some("TEAM123456")),
                ("APPLE_KEY_ID", Some("KEY1234567")),
                ("APPLE_PRIVATE_KEY", Some("pem-data")),
            ],
            || {
                let matches = command().get_matches_from(vec!["test"]);
                let providers = from_matches(&matches);
                let apple = providers.apple.expect("configured");
                assert_eq!(apple.team_id, "TEAM123456");
            },
        );
    }
}
