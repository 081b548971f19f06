//! Account domain types.
//!
//! These types carry no storage metadata; the SQL mapping lives in
//! [`crate::auth::store::postgres`].

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// What a stored action token may be used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPurpose {
    VerifyEmail,
    ResetPassword,
}

impl ActionPurpose {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VerifyEmail => "verify_email",
            Self::ResetPassword => "reset_password",
        }
    }
}

impl fmt::Display for ActionPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted account, including its password hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Build a fresh, unverified account.
    #[must_use]
    pub fn new(
        email: String,
        username: String,
        password_hash: String,
        role: Role,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            email,
            username,
            password_hash,
            role,
            is_active: true,
            is_verified: false,
            last_login_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Strip the password hash before handing the account to a caller.
    #[must_use]
    pub fn sanitize(self) -> PublicAccount {
        PublicAccount {
            id: self.id,
            email: self.email,
            username: self.username,
            password: String::new(),
            role: self.role,
            is_active: self.is_active,
            is_verified: self.is_verified,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Account as returned to callers. `password` is always empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublicAccount {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration input.
#[derive(Debug)]
pub struct Candidate {
    pub email: String,
    pub username: String,
    pub password: SecretString,
    pub role: Role,
}

impl Candidate {
    #[must_use]
    pub fn new(email: &str, username: &str, password: SecretString) -> Self {
        Self {
            email: email.to_string(),
            username: username.to_string(),
            password,
            role: Role::User,
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

/// Profile fields that may be changed after registration.
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub email: Option<String>,
    pub username: Option<String>,
    pub role: Option<Role>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account::new(
            "alice@x.com".to_string(),
            "alice".to_string(),
            "$argon2id$hash".to_string(),
            Role::User,
            Utc::now(),
        )
    }

    #[test]
    fn new_account_is_unverified_and_active() {
        let account = account();
        assert!(!account.is_verified);
        assert!(account.is_active);
        assert!(!account.is_deleted());
        assert_eq!(account.created_at, account.updated_at);
    }

    #[test]
    fn sanitize_strips_password() -> anyhow::Result<()> {
        let public = account().sanitize();
        assert!(public.password.is_empty());

        let json = serde_json::to_value(&public)?;
        assert!(json.get("password").is_none());
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "user");
        Ok(())
    }

    #[test]
    fn role_round_trips_through_str() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(Role::User.to_string(), "user");
        assert!("manager".parse::<Role>().is_err());
    }

    #[test]
    fn purpose_names() {
        assert_eq!(ActionPurpose::VerifyEmail.as_str(), "verify_email");
        assert_eq!(ActionPurpose::ResetPassword.to_string(), "reset_password");
    }
}
