//! Session token signing and action token generation.
//!
//! Access and refresh tokens are HS256 JWTs carrying a `kind` claim, so one
//! kind can never be accepted where the other is expected. They are not
//! persisted and cannot be revoked before they expire.
//!
//! Action tokens (email verification, password reset) are 256 random bits,
//! base64url encoded. They carry no claims: the store holds their digest and
//! deleting it is what makes them single-use.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, EncodingKey,
    Header, Validation,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::account::{ActionPurpose, Role};
use super::clock::Clock;
use super::config::AuthConfig;

const ACTION_TOKEN_BYTES: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub kind: TokenKind,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    /// Subject as an account id.
    ///
    /// # Errors
    /// [`TokenError::Invalid`] if the subject is not a UUID.
    pub fn account_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Invalid)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("failed to generate random token: {0}")]
    Entropy(String),
}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: &SecretString, config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: config.issuer().to_string(),
            access_ttl: config.access_ttl(),
            refresh_ttl: config.refresh_ttl(),
            clock,
        }
    }

    /// # Errors
    /// [`TokenError::Signing`] if the claims cannot be encoded.
    pub fn issue_access(&self, account_id: Uuid, role: Role) -> Result<String, TokenError> {
        self.sign(account_id, Some(role), TokenKind::Access, self.access_ttl)
    }

    /// # Errors
    /// [`TokenError::Signing`] if the claims cannot be encoded.
    pub fn issue_refresh(&self, account_id: Uuid) -> Result<String, TokenError> {
        self.sign(account_id, None, TokenKind::Refresh, self.refresh_ttl)
    }

    fn sign(
        &self,
        account_id: Uuid,
        role: Option<Role>,
        kind: TokenKind,
        ttl: chrono::Duration,
    ) -> Result<String, TokenError> {
        let now = self.clock.now();
        let claims = Claims {
            sub: account_id.to_string(),
            role,
            kind,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| TokenError::Signing(err.to_string()))
    }

    /// Check signature, issuer, kind and expiry.
    ///
    /// Expiry is checked against the injected clock rather than inside the
    /// JWT library so the whole manager shares one notion of "now".
    ///
    /// # Errors
    /// [`TokenError::Expired`] past `exp`, [`TokenError::Invalid`] for anything else.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|err| {
            debug!("token rejected: {err}");
            match err.kind() {
                JwtErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;

        let claims = data.claims;
        if claims.kind != expected {
            debug!(kind = ?claims.kind, expected = ?expected, "token kind mismatch");
            return Err(TokenError::Invalid);
        }

        if claims.exp <= self.clock.now().timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Generate an opaque single-use token for `purpose`.
    ///
    /// # Errors
    /// [`TokenError::Entropy`] if the OS random source fails.
    pub fn issue_action_token(&self, purpose: ActionPurpose) -> Result<String, TokenError> {
        let mut bytes = [0u8; ACTION_TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| TokenError::Entropy(err.to_string()))?;
        debug!(%purpose, "issued action token");
        Ok(Base64UrlUnpadded::encode_string(&bytes))
    }

    /// Expiry for an action token of `purpose` issued now.
    #[must_use]
    pub fn action_token_expiry(
        &self,
        purpose: ActionPurpose,
        config: &AuthConfig,
    ) -> DateTime<Utc> {
        let ttl = match purpose {
            ActionPurpose::VerifyEmail => config.verification_ttl(),
            ActionPurpose::ResetPassword => config.reset_ttl(),
        };
        self.clock.now() + ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use chrono::Duration;

    fn issuer_with(clock: Arc<ManualClock>) -> TokenIssuer {
        let config = AuthConfig::new("https://sesame.dev".to_string());
        TokenIssuer::new(
            &SecretString::from("test-signing-secret"),
            &config,
            clock,
        )
    }

    #[test]
    fn access_token_round_trip() -> anyhow::Result<()> {
        let issuer = issuer_with(Arc::new(ManualClock::default()));
        let id = Uuid::new_v4();
        let token = issuer.issue_access(id, Role::Admin)?;

        let claims = issuer.verify(&token, TokenKind::Access)?;
        assert_eq!(claims.account_id()?, id);
        assert_eq!(claims.role, Some(Role::Admin));
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.iss, "sesame");
        assert_eq!(claims.exp - claims.iat, 15 * 60);
        Ok(())
    }

    #[test]
    fn kinds_are_not_interchangeable() -> anyhow::Result<()> {
        let issuer = issuer_with(Arc::new(ManualClock::default()));
        let id = Uuid::new_v4();
        let access = issuer.issue_access(id, Role::User)?;
        let refresh = issuer.issue_refresh(id)?;

        assert!(matches!(
            issuer.verify(&access, TokenKind::Refresh),
            Err(TokenError::Invalid)
        ));
        assert!(matches!(
            issuer.verify(&refresh, TokenKind::Access),
            Err(TokenError::Invalid)
        ));
        assert_eq!(issuer.verify(&refresh, TokenKind::Refresh)?.role, None);
        Ok(())
    }

    #[test]
    fn expired_token() -> anyhow::Result<()> {
        let clock = Arc::new(ManualClock::default());
        let issuer = issuer_with(clock.clone());
        let token = issuer.issue_access(Uuid::new_v4(), Role::User)?;

        clock.advance(Duration::minutes(15));
        assert!(matches!(
            issuer.verify(&token, TokenKind::Access),
            Err(TokenError::Expired)
        ));
        Ok(())
    }

    #[test]
    fn foreign_signature_is_invalid() -> anyhow::Result<()> {
        let clock = Arc::new(ManualClock::default());
        let issuer = issuer_with(clock.clone());
        let other = TokenIssuer::new(
            &SecretString::from("another-secret"),
            &AuthConfig::new("https://sesame.dev".to_string()),
            clock,
        );
        let token = other.issue_access(Uuid::new_v4(), Role::User)?;
        assert!(matches!(
            issuer.verify(&token, TokenKind::Access),
            Err(TokenError::Invalid)
        ));
        assert!(matches!(
            issuer.verify("not.a.jwt", TokenKind::Access),
            Err(TokenError::Invalid)
        ));
        Ok(())
    }

    #[test]
    fn foreign_issuer_is_invalid() -> anyhow::Result<()> {
        let clock = Arc::new(ManualClock::default());
        let issuer = issuer_with(clock.clone());
        let other = TokenIssuer::new(
            &SecretString::from("test-signing-secret"),
            &AuthConfig::new("https://sesame.dev".to_string()).with_issuer("elsewhere".to_string()),
            clock,
        );
        let token = other.issue_refresh(Uuid::new_v4())?;
        assert!(matches!(
            issuer.verify(&token, TokenKind::Refresh),
            Err(TokenError::Invalid)
        ));
        Ok(())
    }

    #[test]
    fn action_tokens_are_random_256_bit() -> anyhow::Result<()> {
        let issuer = issuer_with(Arc::new(ManualClock::default()));
        let first = issuer.issue_action_token(ActionPurpose::VerifyEmail)?;
        let second = issuer.issue_action_token(ActionPurpose::VerifyEmail)?;
        assert_ne!(first, second);

        let decoded = Base64UrlUnpadded::decode_vec(&first)
            .map_err(|err| anyhow::anyhow!("decode: {err}"))?;
        assert_eq!(decoded.len(), ACTION_TOKEN_BYTES);
        Ok(())
    }

    #[test]
    fn action_token_expiry_per_purpose() {
        let clock = Arc::new(ManualClock::default());
        let issuer = issuer_with(clock.clone());
        let config = AuthConfig::new("https://sesame.dev".to_string());
        let now = clock.now();
        assert_eq!(
            issuer.action_token_expiry(ActionPurpose::VerifyEmail, &config),
            now + Duration::hours(24)
        );
        assert_eq!(
            issuer.action_token_expiry(ActionPurpose::ResetPassword, &config),
            now + Duration::minutes(15)
        );
    }
}
