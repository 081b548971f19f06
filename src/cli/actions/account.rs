//! Lifecycle subcommands against the Postgres store.
//!
//! Every command prints one JSON document on stdout. Lifecycle errors are
//! returned to `main`, which reports them on stderr with a non-zero exit.

use anyhow::Result;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::auth::{
    Candidate, EmailNotifier, LifecycleManager, LogEmailSender, PgAccountStore, Role,
    SystemClock, TokenIssuer,
};
use crate::cli::commands::auth::Options;

const PRODUCT_NAME: &str = "Sesame";

#[derive(Debug)]
pub enum Command {
    Register {
        email: String,
        username: String,
        password: SecretString,
        role: Role,
    },
    VerifyEmail {
        token: String,
    },
    ResendVerification {
        email: String,
    },
    Login {
        email: String,
        password: SecretString,
    },
    ResetPassword {
        email: String,
    },
    CompleteReset {
        token: String,
        password: SecretString,
    },
    Refresh {
        token: String,
    },
    DeleteAccount {
        account_id: Uuid,
    },
}

#[derive(Debug)]
pub struct Args {
    pub dsn: String,
    pub options: Options,
    pub command: Command,
}

/// Execute a lifecycle subcommand.
/// # Errors
/// Returns an error if the configuration is invalid, the database is
/// unreachable, or the operation fails.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.options.auth_config()?;
    let pool = super::connect(&args.dsn).await?;

    let clock = Arc::new(SystemClock);
    let tokens = Arc::new(TokenIssuer::new(
        &args.options.jwt_secret,
        &config,
        clock.clone(),
    ));
    let notifier = EmailNotifier::new(Arc::new(LogEmailSender), PRODUCT_NAME.to_string());

    let manager = LifecycleManager::new(
        Arc::new(PgAccountStore::new(pool)),
        Arc::new(notifier),
        Arc::new(args.options.hasher()?),
        tokens,
        clock,
        config,
    );

    let output = run(&manager, args.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

/// Run `command` and render its result as JSON.
/// # Errors
/// Returns the lifecycle error of the operation.
pub async fn run(manager: &LifecycleManager, command: Command) -> Result<Value> {
    let output = match command {
        Command::Register {
            email,
            username,
            password,
            role,
        } => {
            let candidate = Candidate::new(&email, &username, password).with_role(role);
            let account = manager.register(candidate).await?;
            json!({ "account": account })
        }
        Command::VerifyEmail { token } => {
            let account_id = manager.verify_email(&token).await?;
            json!({ "verified": true, "account_id": account_id })
        }
        Command::ResendVerification { email } => {
            manager.resend_verification(&email).await?;
            json!({ "sent": true })
        }
        Command::Login { email, password } => {
            let outcome = manager.login(&email, &password).await?;
            json!({
                "account": outcome.account,
                "access_token": outcome.access_token,
                "refresh_token": outcome.refresh_token,
            })
        }
        Command::ResetPassword { email } => {
            manager.initiate_password_reset(&email).await?;
            json!({ "sent": true })
        }
        Command::CompleteReset { token, password } => {
            let account_id = manager.complete_password_reset(&token, &password).await?;
            json!({ "reset": true, "account_id": account_id })
        }
        Command::Refresh { token } => {
            let access_token = manager.refresh_token(&token).await?;
            json!({ "access_token": access_token })
        }
        Command::DeleteAccount { account_id } => {
            manager.delete_account(account_id).await?;
            json!({ "deleted": true, "account_id": account_id })
        }
    };

    debug!("command completed");
    Ok(output)
}
