//! Postgres-backed account store.
//!
//! Schema lives in `db/sql/schema.sql`. Email and username uniqueness is
//! enforced by partial unique indexes over non-deleted rows; violations are
//! mapped back to [`StoreError::EmailExists`] / [`StoreError::UsernameExists`]
//! by index name.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{AccountStore, ConsumeEffect, StoreError, UpdatedProfile};
use crate::auth::account::{Account, ActionPurpose, ProfileChanges, Role};

pub const SCHEMA_SQL: &str = include_str!("../../../db/sql/schema.sql");

const EMAIL_INDEX: &str = "accounts_email_key";
const USERNAME_INDEX: &str = "accounts_username_key";

const ACCOUNT_COLUMNS: &str = "id, email, username, password_hash, role, is_active, is_verified, \
     last_login_at, created_at, updated_at, deleted_at";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Translate a failed write into the uniqueness variant it represents, if any.
fn map_write_error(err: sqlx::Error, context: &'static str) -> StoreError {
    if is_unique_violation(&err) {
        let constraint = match &err {
            sqlx::Error::Database(db_err) => db_err.constraint().map(ToString::to_string),
            _ => None,
        };
        match constraint.as_deref() {
            Some(EMAIL_INDEX) => return StoreError::EmailExists,
            Some(USERNAME_INDEX) => return StoreError::UsernameExists,
            _ => {}
        }
    }
    StoreError::Backend(anyhow::Error::new(err).context(context))
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let role: String = row.try_get("role").context("failed to read role")?;
    let role = role
        .parse::<Role>()
        .map_err(|err| StoreError::Backend(anyhow!(err)))?;

    Ok(Account {
        id: row.try_get("id").context("failed to read id")?,
        email: row.try_get("email").context("failed to read email")?,
        username: row.try_get("username").context("failed to read username")?,
        password_hash: row
            .try_get("password_hash")
            .context("failed to read password hash")?,
        role,
        is_active: row.try_get("is_active").context("failed to read is_active")?,
        is_verified: row
            .try_get("is_verified")
            .context("failed to read is_verified")?,
        last_login_at: row
            .try_get("last_login_at")
            .context("failed to read last_login_at")?,
        created_at: row
            .try_get("created_at")
            .context("failed to read created_at")?,
        updated_at: row
            .try_get("updated_at")
            .context("failed to read updated_at")?,
        deleted_at: row
            .try_get("deleted_at")
            .context("failed to read deleted_at")?,
    })
}

#[derive(Clone, Debug)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema. Statements are idempotent.
    ///
    /// # Errors
    /// Returns an error if any statement fails.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .context("failed to apply schema")?;
        Ok(())
    }

    async fn find_one(&self, column: &'static str, value: &str) -> Result<Account, StoreError> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE {column} = $1 AND deleted_at IS NULL LIMIT 1"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup account")?;

        row.as_ref()
            .map_or(Err(StoreError::NotFound), account_from_row)
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn create(&self, account: &Account) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO accounts
                (id, email, username, password_hash, role, is_active, is_verified,
                 last_login_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account.id)
            .bind(&account.email)
            .bind(&account.username)
            .bind(&account.password_hash)
            .bind(account.role.as_str())
            .bind(account.is_active)
            .bind(account.is_verified)
            .bind(account.last_login_at)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_write_error(err, "failed to insert account"))?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Account, StoreError> {
        self.find_one("email", email).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Account, StoreError> {
        self.find_one("username", username).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Account, StoreError> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 AND deleted_at IS NULL"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup account by id")?;

        row.as_ref()
            .map_or(Err(StoreError::NotFound), account_from_row)
    }

    async fn record_login(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts
            SET last_login_at = $2
            WHERE id = $1
              AND deleted_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(account_id)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        account_id: Uuid,
        changes: &ProfileChanges,
        now: DateTime<Utc>,
    ) -> Result<UpdatedProfile, StoreError> {
        // The locked pre-image decides whether the email changed, so a
        // concurrent verification is only undone by a real email change.
        let query = format!(
            r"
            WITH previous AS (
                SELECT id AS prev_id, email AS prev_email
                FROM accounts
                WHERE id = $1
                  AND deleted_at IS NULL
                FOR UPDATE
            )
            UPDATE accounts
            SET email = COALESCE($2::TEXT, accounts.email),
                username = COALESCE($3::TEXT, accounts.username),
                role = COALESCE($4::TEXT, accounts.role),
                is_verified = CASE
                    WHEN $2::TEXT IS NULL OR $2::TEXT = previous.prev_email
                        THEN accounts.is_verified
                    ELSE FALSE
                END,
                updated_at = $5
            FROM previous
            WHERE accounts.id = previous.prev_id
            RETURNING {ACCOUNT_COLUMNS},
                ($2::TEXT IS NOT NULL AND $2::TEXT <> previous.prev_email) AS email_changed
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(account_id)
            .bind(changes.email.as_deref())
            .bind(changes.username.as_deref())
            .bind(changes.role.map(Role::as_str))
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| map_write_error(err, "failed to update profile"))?;

        let Some(row) = row else {
            return Err(StoreError::NotFound);
        };
        Ok(UpdatedProfile {
            account: account_from_row(&row)?,
            email_changed: row
                .try_get("email_changed")
                .context("failed to read email_changed")?,
        })
    }

    async fn save_action_token(
        &self,
        account_id: Uuid,
        purpose: ActionPurpose,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // One row per (account, purpose): the upsert is what invalidates the prior token.
        let query = r"
            INSERT INTO action_tokens (account_id, purpose, token_hash, expires_at)
            SELECT id, $2, $3, $4 FROM accounts WHERE id = $1 AND deleted_at IS NULL
            ON CONFLICT (account_id, purpose)
            DO UPDATE SET token_hash = EXCLUDED.token_hash,
                          expires_at = EXCLUDED.expires_at,
                          created_at = NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(account_id)
            .bind(purpose.as_str())
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to save action token")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn consume_action_token(
        &self,
        token_hash: &[u8],
        purpose: ActionPurpose,
        now: DateTime<Utc>,
        effect: ConsumeEffect,
    ) -> Result<Uuid, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin consume transaction")?;

        // DELETE .. RETURNING is the single-row conditional step: a concurrent
        // consumer of the same token blocks on the row and then finds nothing.
        let query = r"
            DELETE FROM action_tokens
            USING accounts
            WHERE action_tokens.token_hash = $1
              AND action_tokens.purpose = $2
              AND action_tokens.expires_at > $3
              AND accounts.id = action_tokens.account_id
              AND accounts.deleted_at IS NULL
            RETURNING action_tokens.account_id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .bind(purpose.as_str())
            .bind(now)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await
            .context("failed to consume action token")?;

        let Some(row) = row else {
            let _ = tx.rollback().await;
            return Err(StoreError::TokenInvalid);
        };
        let account_id: Uuid = row
            .try_get("account_id")
            .context("failed to read account_id")?;

        let (query, password_hash) = match effect {
            ConsumeEffect::MarkVerified => (
                r"
                UPDATE accounts
                SET is_verified = TRUE,
                    updated_at = $2
                WHERE id = $1
                ",
                None,
            ),
            ConsumeEffect::ReplacePassword(hash) => (
                r"
                UPDATE accounts
                SET password_hash = $3,
                    updated_at = $2
                WHERE id = $1
                ",
                Some(hash),
            ),
        };
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let mut update = sqlx::query(query).bind(account_id).bind(now);
        if let Some(hash) = password_hash {
            update = update.bind(hash);
        }
        update
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to apply action token")?;

        tx.commit().await.context("commit consume transaction")?;

        Ok(account_id)
    }

    async fn update_password(
        &self,
        account_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts
            SET password_hash = $2,
                updated_at = $3
            WHERE id = $1
              AND deleted_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(account_id)
            .bind(password_hash)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn soft_delete(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin delete transaction")?;

        let query = r"
            UPDATE accounts
            SET deleted_at = $2,
                is_active = FALSE,
                updated_at = $2
            WHERE id = $1
              AND deleted_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(account_id)
            .bind(now)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to soft delete account")?;

        if result.rows_affected() == 0 {
            let _ = tx.rollback().await;
            return Err(StoreError::NotFound);
        }

        let query = "DELETE FROM action_tokens WHERE account_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to drop action tokens")?;

        tx.commit().await.context("commit delete transaction")?;
        Ok(())
    }
}
