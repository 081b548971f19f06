//! Account store contract.
//!
//! The store is the only place durable state lives. Uniqueness of email and
//! username among non-deleted accounts is enforced here, not by callers, so a
//! pre-check in the manager is advisory and `create` is authoritative.
//!
//! Action tokens are handed to the store as SHA-256 digests. A stored token is
//! keyed by (account, purpose): saving a new one replaces the old one, and
//! consuming it deletes it in the same atomic step that applies its effect.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::account::{Account, ActionPurpose, ProfileChanges};

pub use memory::InMemoryAccountStore;
pub use postgres::PgAccountStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already exists")]
    EmailExists,
    #[error("username already exists")]
    UsernameExists,
    #[error("user not found")]
    NotFound,
    #[error("invalid token")]
    TokenInvalid,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// What consuming an action token does to its owner, applied atomically with the consume.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsumeEffect {
    MarkVerified,
    ReplacePassword(String),
}

/// Row after a profile update, and whether the stored email actually changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdatedProfile {
    pub account: Account,
    pub email_changed: bool,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// # Errors
    /// `EmailExists`/`UsernameExists` when a non-deleted account already holds either key.
    async fn create(&self, account: &Account) -> Result<(), StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Account, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Account, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Account, StoreError>;

    /// Stamp `last_login_at`. Touches no other column.
    async fn record_login(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Apply the `Some` fields of `changes`. `is_verified` is cleared only when
    /// the stored email differs from the new one; the password hash is never written.
    ///
    /// # Errors
    /// `EmailExists`/`UsernameExists` when another non-deleted account holds the new key.
    async fn update_profile(
        &self,
        account_id: Uuid,
        changes: &ProfileChanges,
        now: DateTime<Utc>,
    ) -> Result<UpdatedProfile, StoreError>;

    /// Store a token digest, replacing any prior token of the same purpose for this account.
    async fn save_action_token(
        &self,
        account_id: Uuid,
        purpose: ActionPurpose,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Find a live token, delete it and apply `effect` to its owner in one step.
    ///
    /// # Errors
    /// `TokenInvalid` if no unexpired token of `purpose` matches, or its owner was deleted.
    async fn consume_action_token(
        &self,
        token_hash: &[u8],
        purpose: ActionPurpose,
        now: DateTime<Utc>,
        effect: ConsumeEffect,
    ) -> Result<Uuid, StoreError>;

    async fn update_password(
        &self,
        account_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Mark the account deleted and inactive and drop its pending action tokens.
    async fn soft_delete(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError>;
}
