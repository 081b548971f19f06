//! Map validated CLI arguments to an [`Action`].

use crate::auth::Role;
use crate::cli::actions::{
    account::{self, Command},
    migrate, Action,
};
use crate::cli::commands::{
    auth, ARG_ACCOUNT_ID, ARG_DSN, ARG_EMAIL, ARG_PASSWORD, ARG_ROLE, ARG_TOKEN, ARG_USERNAME,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::ArgMatches;
use secrecy::SecretString;
use uuid::Uuid;

fn required(matches: &ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .with_context(|| format!("missing required argument: --{id}"))
}

fn secret(matches: &ArgMatches, id: &str) -> Result<SecretString> {
    required(matches, id).map(SecretString::from)
}

fn command(name: &str, sub: &ArgMatches) -> Result<Command> {
    let command = match name {
        "register" => Command::Register {
            email: required(sub, ARG_EMAIL)?,
            username: required(sub, ARG_USERNAME)?,
            password: secret(sub, ARG_PASSWORD)?,
            role: required(sub, ARG_ROLE)?
                .parse::<Role>()
                .map_err(|err| anyhow!(err))?,
        },
        "verify-email" => Command::VerifyEmail {
            token: required(sub, ARG_TOKEN)?,
        },
        "resend-verification" => Command::ResendVerification {
            email: required(sub, ARG_EMAIL)?,
        },
        "login" => Command::Login {
            email: required(sub, ARG_EMAIL)?,
            password: secret(sub, ARG_PASSWORD)?,
        },
        "reset-password" => Command::ResetPassword {
            email: required(sub, ARG_EMAIL)?,
        },
        "complete-reset" => Command::CompleteReset {
            token: required(sub, ARG_TOKEN)?,
            password: secret(sub, ARG_PASSWORD)?,
        },
        "refresh" => Command::Refresh {
            token: required(sub, ARG_TOKEN)?,
        },
        "delete-account" => Command::DeleteAccount {
            account_id: Uuid::parse_str(&required(sub, ARG_ACCOUNT_ID)?)
                .context("invalid --account-id")?,
        },
        other => bail!("unknown subcommand: {other}"),
    };
    Ok(command)
}

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let dsn = required(matches, ARG_DSN)?;

    match matches.subcommand() {
        Some(("migrate", _)) => Ok(Action::Migrate(migrate::Args { dsn })),
        Some((name, sub)) => {
            let options = auth::Options::parse(matches)?;
            Ok(Action::Account(account::Args {
                dsn,
                options,
                command: command(name, sub)?,
            }))
        }
        None => bail!("missing subcommand"),
    }
}
