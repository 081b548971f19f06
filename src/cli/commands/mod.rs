pub mod auth;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_DSN: &str = "dsn";
pub const ARG_EMAIL: &str = "email";
pub const ARG_USERNAME: &str = "username";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_ROLE: &str = "role";
pub const ARG_TOKEN: &str = "token";
pub const ARG_ACCOUNT_ID: &str = "account-id";

fn email_arg() -> Arg {
    Arg::new(ARG_EMAIL)
        .long(ARG_EMAIL)
        .help("Account email address")
        .required(true)
}

fn password_arg(help: &'static str) -> Arg {
    Arg::new(ARG_PASSWORD)
        .long(ARG_PASSWORD)
        .help(help)
        .env("SESAME_PASSWORD")
        .hide_env_values(true)
        .required(true)
}

fn token_arg(help: &'static str) -> Arg {
    Arg::new(ARG_TOKEN)
        .long(ARG_TOKEN)
        .help(help)
        .required(true)
}

fn subcommands(command: Command) -> Command {
    command
        .subcommand(Command::new("migrate").about("Apply the database schema"))
        .subcommand(
            Command::new("register")
                .about("Create an unverified account and send its verification link")
                .arg(email_arg())
                .arg(
                    Arg::new(ARG_USERNAME)
                        .long(ARG_USERNAME)
                        .help("Unique username, 3 to 30 alphanumeric characters")
                        .required(true),
                )
                .arg(password_arg("Initial password"))
                .arg(
                    Arg::new(ARG_ROLE)
                        .long(ARG_ROLE)
                        .help("Account role")
                        .value_parser(["admin", "user"])
                        .default_value("user"),
                ),
        )
        .subcommand(
            Command::new("verify-email")
                .about("Consume an email verification token")
                .arg(token_arg("Token from the verification link")),
        )
        .subcommand(
            Command::new("resend-verification")
                .about("Send a fresh verification link")
                .arg(email_arg()),
        )
        .subcommand(
            Command::new("login")
                .about("Authenticate and print access and refresh tokens")
                .arg(email_arg())
                .arg(password_arg("Account password")),
        )
        .subcommand(
            Command::new("reset-password")
                .about("Send a password reset link")
                .arg(email_arg()),
        )
        .subcommand(
            Command::new("complete-reset")
                .about("Set a new password using a reset token")
                .arg(token_arg("Token from the reset link"))
                .arg(password_arg("New password")),
        )
        .subcommand(
            Command::new("refresh")
                .about("Exchange a refresh token for a new access token")
                .arg(token_arg("Refresh token")),
        )
        .subcommand(
            Command::new("delete-account")
                .about("Soft delete an account")
                .arg(
                    Arg::new(ARG_ACCOUNT_ID)
                        .long(ARG_ACCOUNT_ID)
                        .help("Account id (UUID)")
                        .required(true),
                ),
        )
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let command = Command::new("sesame")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .env("SESAME_DSN")
                .required(true),
        );

    let command = auth::with_args(command);
    let command = logging::with_args(command);
    subcommands(command)
}
