//! Account lifecycle orchestration: registration, verification, login,
//! password reset and token refresh.
//!
//! The manager holds no mutable state of its own. Every collaborator is passed
//! in at construction and all durable state lives in the [`AccountStore`].
//! Cancelling a call (dropping its future, e.g. under an outer
//! `tokio::time::timeout`) aborts any in-flight store or notifier call.

use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::account::{Account, ActionPurpose, Candidate, ProfileChanges, PublicAccount};
use super::clock::Clock;
use super::config::AuthConfig;
use super::error::{AuthError, Result};
use super::notifier::{bounded, Notifier, NotifyError};
use super::password::{PasswordError, PasswordHasher};
use super::store::{AccountStore, ConsumeEffect, StoreError};
use super::token::{Claims, TokenError, TokenIssuer, TokenKind};
use super::utils::{
    build_action_url, check_email, check_password, check_username, hash_action_token,
    normalize_email,
};

/// Result of a successful login.
#[derive(Debug)]
pub struct LoginOutcome {
    pub account: PublicAccount,
    pub access_token: String,
    pub refresh_token: String,
}

fn store_error(err: StoreError, context: &'static str) -> AuthError {
    match err {
        StoreError::EmailExists => AuthError::EmailExists,
        StoreError::UsernameExists => AuthError::UsernameExists,
        StoreError::NotFound => AuthError::UserNotFound,
        StoreError::TokenInvalid => AuthError::TokenInvalid,
        StoreError::Backend(err) => AuthError::Internal(err.context(context)),
    }
}

fn token_error(err: TokenError, context: &'static str) -> AuthError {
    match err {
        TokenError::Expired => AuthError::TokenExpired,
        TokenError::Invalid => AuthError::TokenInvalid,
        other => AuthError::Internal(anyhow::Error::new(other).context(context)),
    }
}

fn notify_error(err: NotifyError, context: &'static str) -> AuthError {
    AuthError::Internal(anyhow::Error::new(err).context(context))
}

pub struct LifecycleManager {
    store: Arc<dyn AccountStore>,
    notifier: Arc<dyn Notifier>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<TokenIssuer>,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("tokens", &self.tokens)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LifecycleManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn AccountStore>,
        notifier: Arc<dyn Notifier>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<TokenIssuer>,
        clock: Arc<dyn Clock>,
        config: AuthConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            hasher,
            tokens,
            clock,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Create an unverified account and send its verification link.
    ///
    /// If the link cannot be stored or sent, the account still exists and the
    /// caller can use [`Self::resend_verification`].
    ///
    /// # Errors
    /// `EmailExists`, `UsernameExists`, `Validation`, or `Internal`.
    #[instrument(skip_all, fields(email = %candidate.email, username = %candidate.username))]
    pub async fn register(&self, candidate: Candidate) -> Result<PublicAccount> {
        let email = normalize_email(&candidate.email);
        let username = candidate.username.trim().to_string();
        check_email(&email)?;
        check_username(&username)?;
        check_password(candidate.password.expose_secret())?;

        self.ensure_email_free(&email).await?;
        self.ensure_username_free(&username).await?;

        let password_hash = self.hash_password(&candidate.password).await?;
        let account = Account::new(
            email,
            username,
            password_hash,
            candidate.role,
            self.clock.now(),
        );

        // The pre-checks above are advisory; the store's uniqueness is what
        // decides a concurrent registration race.
        self.store.create(&account).await.map_err(|err| {
            if matches!(err, StoreError::EmailExists | StoreError::UsernameExists) {
                warn!("registration lost uniqueness race: {err}");
            }
            store_error(err, "failed to create account")
        })?;

        self.issue_verification(&account).await?;

        info!(account_id = %account.id, "account registered");
        Ok(account.sanitize())
    }

    /// Consume a verification token and mark its owner verified.
    ///
    /// # Errors
    /// `TokenInvalid` for unknown, expired or already-used tokens.
    #[instrument(skip_all)]
    pub async fn verify_email(&self, token: &str) -> Result<Uuid> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::TokenInvalid);
        }

        let account_id = self
            .store
            .consume_action_token(
                &hash_action_token(token),
                ActionPurpose::VerifyEmail,
                self.clock.now(),
                ConsumeEffect::MarkVerified,
            )
            .await
            .map_err(|err| store_error(err, "failed to consume verification token"))?;

        info!(%account_id, "email verified");
        Ok(account_id)
    }

    /// Re-issue a verification link. Unknown or already-verified emails succeed silently.
    ///
    /// # Errors
    /// `Internal` when the store or notifier fails.
    #[instrument(skip_all)]
    pub async fn resend_verification(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        let account = match self.store.find_by_email(&email).await {
            Ok(account) => account,
            Err(StoreError::NotFound) => {
                self.discard_action_token(ActionPurpose::VerifyEmail)?;
                debug!("verification resend for unknown email");
                return Ok(());
            }
            Err(err) => return Err(store_error(err, "failed to find account for resend")),
        };

        if account.is_verified {
            debug!(account_id = %account.id, "verification resend for verified account");
            return Ok(());
        }

        self.issue_verification(&account).await
    }

    /// Authenticate with email and password.
    ///
    /// The password is checked before the verification state, so only a caller
    /// who knows the password learns whether the account is verified. Unknown
    /// emails are verified against a decoy hash to keep timing uniform.
    ///
    /// # Errors
    /// `InvalidCredentials`, `AccountNotVerified`, or `Internal`.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<LoginOutcome> {
        let email = normalize_email(email);

        let mut account = match self.store.find_by_email(&email).await {
            Ok(account) => account,
            Err(StoreError::NotFound) => {
                let decoy = self.hasher.decoy_hash().to_string();
                let _ = self.verify_password(password, decoy).await?;
                warn!("login attempt for unknown email");
                return Err(AuthError::InvalidCredentials);
            }
            Err(err) => return Err(store_error(err, "failed to find account for login")),
        };

        if !self
            .verify_password(password, account.password_hash.clone())
            .await?
        {
            warn!(account_id = %account.id, "invalid password attempt");
            return Err(AuthError::InvalidCredentials);
        }

        if !account.is_active {
            warn!(account_id = %account.id, "login attempt for inactive account");
            return Err(AuthError::InvalidCredentials);
        }

        if !account.is_verified {
            warn!(account_id = %account.id, "login attempt before verification");
            return Err(AuthError::AccountNotVerified);
        }

        let access_token = self
            .tokens
            .issue_access(account.id, account.role)
            .map_err(|err| token_error(err, "failed to issue access token"))?;
        let refresh_token = self
            .tokens
            .issue_refresh(account.id)
            .map_err(|err| token_error(err, "failed to issue refresh token"))?;

        // Only the login stamp is written; a reset committed since the read must survive.
        let now = self.clock.now();
        self.store
            .record_login(account.id, now)
            .await
            .map_err(|err| store_error(err, "failed to record login"))?;
        account.last_login_at = Some(now);

        info!(account_id = %account.id, "login successful");
        Ok(LoginOutcome {
            account: account.sanitize(),
            access_token,
            refresh_token,
        })
    }

    /// Send a reset link if the email belongs to an account. Always succeeds for
    /// unknown emails so the response never reveals whether an account exists.
    ///
    /// # Errors
    /// `Internal` when the store or notifier fails for an existing account.
    #[instrument(skip_all)]
    pub async fn initiate_password_reset(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        let account = match self.store.find_by_email(&email).await {
            Ok(account) => account,
            Err(StoreError::NotFound) => {
                // Same token work as the known path; only delivery is skipped.
                self.discard_action_token(ActionPurpose::ResetPassword)?;
                debug!("password reset requested for unknown email");
                return Ok(());
            }
            Err(err) => return Err(store_error(err, "failed to find account for reset")),
        };

        let token = self.save_action_token(&account, ActionPurpose::ResetPassword).await?;
        let link = build_action_url(self.config.base_url(), self.config.reset_path(), &token)
            .context("failed to build reset link")?;

        bounded(
            self.config.notify_timeout(),
            self.notifier.send_password_reset(&account.email, &link),
        )
        .await
        .map_err(|err| {
            error!(account_id = %account.id, "failed to send password reset email: {err}");
            notify_error(err, "failed to send password reset email")
        })?;

        info!(account_id = %account.id, "password reset initiated");
        Ok(())
    }

    /// Replace the password of the reset token's owner and consume the token.
    ///
    /// # Errors
    /// `TokenInvalid`, `Validation`, or `Internal`.
    #[instrument(skip_all)]
    pub async fn complete_password_reset(
        &self,
        token: &str,
        new_password: &SecretString,
    ) -> Result<Uuid> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::TokenInvalid);
        }
        check_password(new_password.expose_secret())?;

        let password_hash = self.hash_password(new_password).await?;
        let account_id = self
            .store
            .consume_action_token(
                &hash_action_token(token),
                ActionPurpose::ResetPassword,
                self.clock.now(),
                ConsumeEffect::ReplacePassword(password_hash),
            )
            .await
            .map_err(|err| store_error(err, "failed to consume reset token"))?;

        info!(%account_id, "password reset completed");
        Ok(account_id)
    }

    /// Exchange a refresh token for a new access token. The refresh token is
    /// not rotated and stays valid until it expires.
    ///
    /// # Errors
    /// `TokenInvalid`, `TokenExpired`, `UserNotFound`, `AccountNotVerified`, or `Internal`.
    #[instrument(skip_all)]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<String> {
        let claims = self
            .tokens
            .verify(refresh_token, TokenKind::Refresh)
            .map_err(|err| token_error(err, "failed to verify refresh token"))?;
        let account_id = claims
            .account_id()
            .map_err(|err| token_error(err, "failed to read refresh token subject"))?;

        let account = self
            .store
            .find_by_id(account_id)
            .await
            .map_err(|err| store_error(err, "failed to find account for refresh"))?;
        if !account.is_active {
            return Err(AuthError::UserNotFound);
        }
        // An email change drops verification; sessions stop extending until re-verified.
        if !account.is_verified {
            return Err(AuthError::AccountNotVerified);
        }

        let access_token = self
            .tokens
            .issue_access(account.id, account.role)
            .map_err(|err| token_error(err, "failed to issue access token"))?;

        debug!(%account_id, "token refreshed");
        Ok(access_token)
    }

    /// Validate an access token presented on an API call.
    ///
    /// # Errors
    /// `TokenInvalid` or `TokenExpired`.
    pub fn authenticate(&self, access_token: &str) -> Result<Claims> {
        self.tokens
            .verify(access_token, TokenKind::Access)
            .map_err(|err| token_error(err, "failed to verify access token"))
    }

    /// Look up an account by id, email or username.
    ///
    /// # Errors
    /// `UserNotFound` or `Internal`.
    #[instrument(skip(self))]
    pub async fn find_account(&self, identifier: &str) -> Result<PublicAccount> {
        let identifier = identifier.trim();
        let found = if let Ok(id) = Uuid::parse_str(identifier) {
            self.store.find_by_id(id).await
        } else if identifier.contains('@') {
            self.store.find_by_email(&normalize_email(identifier)).await
        } else {
            self.store.find_by_username(identifier).await
        };

        found
            .map(Account::sanitize)
            .map_err(|err| store_error(err, "failed to find account"))
    }

    /// Change email, username or role. A new email resets verification and
    /// sends a fresh verification link.
    ///
    /// # Errors
    /// `UserNotFound`, `EmailExists`, `UsernameExists`, `Validation`, or `Internal`.
    #[instrument(skip(self, changes))]
    pub async fn update_profile(
        &self,
        account_id: Uuid,
        changes: ProfileChanges,
    ) -> Result<PublicAccount> {
        let email = changes.email.as_deref().map(normalize_email);
        if let Some(email) = &email {
            check_email(email)?;
        }
        let username = changes.username.as_deref().map(|name| name.trim().to_string());
        if let Some(username) = &username {
            check_username(username)?;
        }
        let changes = ProfileChanges {
            email,
            username,
            role: changes.role,
        };

        let updated = self
            .store
            .update_profile(account_id, &changes, self.clock.now())
            .await
            .map_err(|err| store_error(err, "failed to update account"))?;
        let (account, email_changed) = (updated.account, updated.email_changed);

        if email_changed {
            self.issue_verification(&account).await?;
        }

        info!(%account_id, email_changed, "account updated");
        Ok(account.sanitize())
    }

    /// Change the password of an authenticated account.
    ///
    /// # Errors
    /// `InvalidCredentials` when `current` is wrong, `UserNotFound`, `Validation`, or `Internal`.
    #[instrument(skip(self, current, new_password))]
    pub async fn change_password(
        &self,
        account_id: Uuid,
        current: &SecretString,
        new_password: &SecretString,
    ) -> Result<()> {
        let account = self
            .store
            .find_by_id(account_id)
            .await
            .map_err(|err| store_error(err, "failed to find account for password change"))?;

        if !self
            .verify_password(current, account.password_hash.clone())
            .await?
        {
            warn!(%account_id, "password change with wrong current password");
            return Err(AuthError::InvalidCredentials);
        }
        check_password(new_password.expose_secret())?;

        let password_hash = self.hash_password(new_password).await?;
        self.store
            .update_password(account_id, &password_hash, self.clock.now())
            .await
            .map_err(|err| store_error(err, "failed to update password"))?;

        info!(%account_id, "password changed");
        Ok(())
    }

    /// Soft delete. The account disappears from every lookup; issued session
    /// tokens stop refreshing.
    ///
    /// # Errors
    /// `UserNotFound` or `Internal`.
    #[instrument(skip(self))]
    pub async fn delete_account(&self, account_id: Uuid) -> Result<()> {
        self.store
            .soft_delete(account_id, self.clock.now())
            .await
            .map_err(|err| store_error(err, "failed to delete account"))?;

        info!(%account_id, "account deleted");
        Ok(())
    }

    async fn ensure_email_free(&self, email: &str) -> Result<()> {
        match self.store.find_by_email(email).await {
            Ok(_) => {
                warn!("email already exists");
                Err(AuthError::EmailExists)
            }
            Err(StoreError::NotFound) => Ok(()),
            Err(err) => Err(store_error(err, "failed to check email existence")),
        }
    }

    async fn ensure_username_free(&self, username: &str) -> Result<()> {
        match self.store.find_by_username(username).await {
            Ok(_) => {
                warn!("username already exists");
                Err(AuthError::UsernameExists)
            }
            Err(StoreError::NotFound) => Ok(()),
            Err(err) => Err(store_error(err, "failed to check username existence")),
        }
    }

    /// Generate, persist and return a raw action token for `account`.
    async fn save_action_token(&self, account: &Account, purpose: ActionPurpose) -> Result<String> {
        let token = self
            .tokens
            .issue_action_token(purpose)
            .map_err(|err| token_error(err, "failed to generate action token"))?;
        let expires_at = self.tokens.action_token_expiry(purpose, &self.config);

        self.store
            .save_action_token(account.id, purpose, &hash_action_token(&token), expires_at)
            .await
            .map_err(|err| store_error(err, "failed to save action token"))?;

        Ok(token)
    }

    /// Generate and digest a token that is never stored or sent.
    fn discard_action_token(&self, purpose: ActionPurpose) -> Result<()> {
        let token = self
            .tokens
            .issue_action_token(purpose)
            .map_err(|err| token_error(err, "failed to generate action token"))?;
        let _ = hash_action_token(&token);
        Ok(())
    }

    async fn issue_verification(&self, account: &Account) -> Result<()> {
        let token = self
            .save_action_token(account, ActionPurpose::VerifyEmail)
            .await?;
        let link = build_action_url(self.config.base_url(), self.config.verify_path(), &token)
            .context("failed to build verification link")?;

        bounded(
            self.config.notify_timeout(),
            self.notifier.send_verification(&account.email, &link),
        )
        .await
        .map_err(|err| {
            error!(account_id = %account.id, "failed to send verification email: {err}");
            notify_error(err, "failed to send verification email")
        })
    }

    /// Argon2 is CPU-bound; run it off the async workers.
    async fn hash_password(&self, password: &SecretString) -> Result<String> {
        let hasher = Arc::clone(&self.hasher);
        let plaintext = SecretString::from(password.expose_secret().to_string());

        let hashed = tokio::task::spawn_blocking(move || hasher.hash(plaintext.expose_secret()))
            .await
            .context("password hashing task failed")?
            .context("failed to hash password")?;
        Ok(hashed)
    }

    /// `Ok(false)` on mismatch; `Err` only for hasher failures.
    async fn verify_password(&self, password: &SecretString, hash: String) -> Result<bool> {
        let hasher = Arc::clone(&self.hasher);
        let plaintext = SecretString::from(password.expose_secret().to_string());

        let outcome =
            tokio::task::spawn_blocking(move || hasher.verify(plaintext.expose_secret(), &hash))
                .await
                .context("password verification task failed")?;

        match outcome {
            Ok(()) => Ok(true),
            Err(PasswordError::CredentialMismatch) => Ok(false),
            Err(err) => Err(AuthError::Internal(
                anyhow::Error::new(err).context("failed to verify password"),
            )),
        }
    }
}
