use clap::{Arg, Command};

pub const ARG_JWT_PRIVATE_KEY: &str = "jwt-private-key";
pub const ARG_JWT_PUBLIC_KEY: &str = "jwt-public-key";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_PRIVATE_KEY)
                .long(ARG_JWT_PRIVATE_KEY)
                .help("ES256 signing key, PEM or base64-wrapped PEM")
                .env("JWT_PRIVATE_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_JWT_PUBLIC_KEY)
                .long(ARG_JWT_PUBLIC_KEY)
                .help("ES256 verification key, PEM or base64-wrapped PEM")
                .env("JWT_PUBLIC_KEY")
                .required(true),
        )
}
