//! In-memory account store used by tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AccountStore, ConsumeEffect, StoreError, UpdatedProfile};
use crate::auth::account::{Account, ActionPurpose, ProfileChanges};

#[derive(Debug)]
struct StoredToken {
    hash: Vec<u8>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    tokens: HashMap<(Uuid, ActionPurpose), StoredToken>,
}

impl Inner {
    fn live(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values().filter(|account| !account.is_deleted())
    }

    fn check_unique(&self, candidate: &Account) -> Result<(), StoreError> {
        let others = || self.live().filter(|account| account.id != candidate.id);
        if others().any(|account| account.email == candidate.email) {
            return Err(StoreError::EmailExists);
        }
        if others().any(|account| account.username == candidate.username) {
            return Err(StoreError::UsernameExists);
        }
        Ok(())
    }

    fn live_mut(&mut self, id: Uuid) -> Result<&mut Account, StoreError> {
        self.accounts
            .get_mut(&id)
            .filter(|account| !account.is_deleted())
            .ok_or(StoreError::NotFound)
    }
}

/// A single mutex guards accounts and tokens, so every operation is atomic.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    inner: Mutex<Inner>,
}

impl InMemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored (possibly expired) action tokens for `account_id`.
    pub async fn pending_tokens(&self, account_id: Uuid) -> usize {
        let inner = self.inner.lock().await;
        inner
            .tokens
            .keys()
            .filter(|(owner, _)| *owner == account_id)
            .count()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn create(&self, account: &Account) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.check_unique(account)?;
        inner.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Account, StoreError> {
        let inner = self.inner.lock().await;
        let found = inner.live().find(|account| account.email == email).cloned();
        found.ok_or(StoreError::NotFound)
    }

    async fn find_by_username(&self, username: &str) -> Result<Account, StoreError> {
        let inner = self.inner.lock().await;
        let found = inner
            .live()
            .find(|account| account.username == username)
            .cloned();
        found.ok_or(StoreError::NotFound)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Account, StoreError> {
        let mut inner = self.inner.lock().await;
        let account = inner.live_mut(id)?.clone();
        Ok(account)
    }

    async fn record_login(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let account = inner.live_mut(account_id)?;
        account.last_login_at = Some(now);
        Ok(())
    }

    async fn update_profile(
        &self,
        account_id: Uuid,
        changes: &ProfileChanges,
        now: DateTime<Utc>,
    ) -> Result<UpdatedProfile, StoreError> {
        let mut inner = self.inner.lock().await;

        let mut updated = inner.live_mut(account_id)?.clone();
        let email_changed = changes
            .email
            .as_ref()
            .is_some_and(|email| *email != updated.email);
        if let Some(email) = &changes.email {
            updated.email.clone_from(email);
        }
        if let Some(username) = &changes.username {
            updated.username.clone_from(username);
        }
        if let Some(role) = changes.role {
            updated.role = role;
        }
        if email_changed {
            updated.is_verified = false;
        }
        updated.updated_at = now;

        inner.check_unique(&updated)?;
        inner.accounts.insert(account_id, updated.clone());
        Ok(UpdatedProfile {
            account: updated,
            email_changed,
        })
    }

    async fn save_action_token(
        &self,
        account_id: Uuid,
        purpose: ActionPurpose,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.live_mut(account_id)?;
        inner.tokens.insert(
            (account_id, purpose),
            StoredToken {
                hash: token_hash.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn consume_action_token(
        &self,
        token_hash: &[u8],
        purpose: ActionPurpose,
        now: DateTime<Utc>,
        effect: ConsumeEffect,
    ) -> Result<Uuid, StoreError> {
        let mut inner = self.inner.lock().await;

        let key = inner
            .tokens
            .iter()
            .find(|((_, stored_purpose), token)| {
                *stored_purpose == purpose && token.hash == token_hash && token.expires_at > now
            })
            .map(|(key, _)| *key)
            .ok_or(StoreError::TokenInvalid)?;
        let (account_id, _) = key;

        let account = inner
            .live_mut(account_id)
            .map_err(|_| StoreError::TokenInvalid)?;
        match effect {
            ConsumeEffect::MarkVerified => account.is_verified = true,
            ConsumeEffect::ReplacePassword(hash) => account.password_hash = hash,
        }
        account.updated_at = now;

        inner.tokens.remove(&key);
        Ok(account_id)
    }

    async fn update_password(
        &self,
        account_id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let account = inner.live_mut(account_id)?;
        account.password_hash = password_hash.to_string();
        account.updated_at = now;
        Ok(())
    }

    async fn soft_delete(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let account = inner.live_mut(account_id)?;
        account.deleted_at = Some(now);
        account.is_active = false;
        account.updated_at = now;
        inner.tokens.retain(|(owner, _), _| *owner != account_id);
        Ok(())
    }
}
