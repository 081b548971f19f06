use crate::auth::PgAccountStore;
use anyhow::Result;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub dsn: String,
}

/// Apply `db/sql/schema.sql`. The schema is idempotent, so re-running is safe.
/// # Errors
/// Returns an error if the database is unreachable or a statement fails.
pub async fn execute(args: Args) -> Result<()> {
    let pool = super::connect(&args.dsn).await?;
    PgAccountStore::new(pool).migrate().await?;

    info!("schema applied");
    println!("{}", serde_json::json!({ "migrated": true }));
    Ok(())
}
