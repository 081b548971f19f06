//! Credential and session lifecycle.
//!
//! [`LifecycleManager`] drives every flow. It is built from trait objects so
//! the store, notifier, hasher and clock can be swapped without touching the
//! flows:
//!
//! - [`AccountStore`]: [`InMemoryAccountStore`] or [`PgAccountStore`]
//! - [`Notifier`]: [`EmailNotifier`] or [`RecordingNotifier`]
//! - [`PasswordHasher`]: [`Argon2Hasher`]
//! - [`Clock`]: [`SystemClock`] or [`ManualClock`]

pub mod account;
pub mod clock;
pub mod config;
pub mod error;
pub mod manager;
pub mod notifier;
pub mod password;
pub mod store;
pub mod token;
pub(crate) mod utils;

pub use account::{Account, ActionPurpose, Candidate, ProfileChanges, PublicAccount, Role};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorKind};
pub use manager::{LifecycleManager, LoginOutcome};
pub use notifier::{
    EmailNotifier, EmailSender, LogEmailSender, Notifier, NotifyError, RecordingNotifier,
};
pub use password::{Argon2Hasher, PasswordError, PasswordHasher};
pub use store::{
    AccountStore, ConsumeEffect, InMemoryAccountStore, PgAccountStore, StoreError, UpdatedProfile,
};
pub use token::{Claims, TokenError, TokenIssuer, TokenKind};
