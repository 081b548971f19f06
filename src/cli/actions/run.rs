use crate::cli::actions::{account, migrate, Action};
use anyhow::Result;

/// Execute the provided action.
// This is the single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Migrate(args) => migrate::execute(args).await,
        Action::Account(args) => account::execute(args).await,
    }
}
