//! Error taxonomy surfaced by the lifecycle manager.

use thiserror::Error;

/// Stable tag for an [`AuthError`], used by callers to map errors to responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EmailExists,
    UsernameExists,
    InvalidCredentials,
    AccountNotVerified,
    TokenInvalid,
    TokenExpired,
    UserNotFound,
    Validation,
    Internal,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("email already exists")]
    EmailExists,
    #[error("username already exists")]
    UsernameExists,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account not verified")]
    AccountNotVerified,
    #[error("invalid token")]
    TokenInvalid,
    #[error("token has expired")]
    TokenExpired,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid input: {0}")]
    Validation(&'static str),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EmailExists => ErrorKind::EmailExists,
            Self::UsernameExists => ErrorKind::UsernameExists,
            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            Self::AccountNotVerified => ErrorKind::AccountNotVerified,
            Self::TokenInvalid => ErrorKind::TokenInvalid,
            Self::TokenExpired => ErrorKind::TokenExpired,
            Self::UserNotFound => ErrorKind::UserNotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Client-correctable errors may be shown to the caller as-is.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }

    /// Message safe to hand to untrusted callers; collaborator detail is withheld.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T, E = AuthError> = std::result::Result<T, E>;
