//! Argon2id password hashing.

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use thiserror::Error;

/// ~100ms per verification on a typical server core.
pub const DEFAULT_MEMORY_KIB: u32 = 19 * 1024;
pub const DEFAULT_ITERATIONS: u32 = 2;
pub const DEFAULT_PARALLELISM: u32 = 1;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("credential mismatch")]
    CredentialMismatch,
    #[error("invalid argon2 parameters: {0}")]
    Params(String),
    #[error("password hashing error: {0}")]
    Hash(String),
}

impl From<argon2::password_hash::Error> for PasswordError {
    fn from(err: argon2::password_hash::Error) -> Self {
        match err {
            argon2::password_hash::Error::Password => Self::CredentialMismatch,
            other => Self::Hash(other.to_string()),
        }
    }
}

/// One-way hashing of credential secrets.
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext secret with a fresh random salt.
    ///
    /// # Errors
    /// Fails only on entropy or algorithm errors.
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError>;

    /// # Errors
    /// [`PasswordError::CredentialMismatch`] when `plaintext` does not match `hash`.
    fn verify(&self, plaintext: &str, hash: &str) -> Result<(), PasswordError>;

    /// A valid hash of an unguessable secret, verified against when no account
    /// matches so that lookups cost the same either way.
    fn decoy_hash(&self) -> &str;
}

pub struct Argon2Hasher {
    argon2: Argon2<'static>,
    decoy: String,
}

impl std::fmt::Debug for Argon2Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2Hasher")
            .field("params", self.argon2.params())
            .finish_non_exhaustive()
    }
}

impl Argon2Hasher {
    /// # Errors
    /// Fails if the default parameters are rejected or the decoy hash cannot be built.
    pub fn new() -> Result<Self, PasswordError> {
        Self::with_params(DEFAULT_MEMORY_KIB, DEFAULT_ITERATIONS, DEFAULT_PARALLELISM)
    }

    /// # Errors
    /// Returns [`PasswordError::Params`] for out-of-range costs.
    pub fn with_params(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, PasswordError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|err| PasswordError::Params(err.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let decoy_secret = SaltString::generate(&mut OsRng);
        let decoy = hash_with(&argon2, decoy_secret.as_str())?;

        Ok(Self { argon2, decoy })
    }
}

fn hash_with(argon2: &Argon2<'_>, plaintext: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2.hash_password(plaintext.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        hash_with(&self.argon2, plaintext)
    }

    fn verify(&self, plaintext: &str, hash: &str) -> Result<(), PasswordError> {
        let parsed = PasswordHash::new(hash)?;
        self.argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .map_err(PasswordError::from)
    }

    fn decoy_hash(&self) -> &str {
        &self.decoy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> Argon2Hasher {
        match Argon2Hasher::with_params(8, 1, 1) {
            Ok(hasher) => hasher,
            Err(err) => panic!("argon2 params: {err}"),
        }
    }

    #[test]
    fn hash_then_verify() -> anyhow::Result<()> {
        let hasher = hasher();
        let hash = hasher.hash("pw123456")?;
        assert!(hash.starts_with("$argon2id$"));
        hasher.verify("pw123456", &hash)?;
        Ok(())
    }

    #[test]
    fn salts_differ() -> anyhow::Result<()> {
        let hasher = hasher();
        assert_ne!(hasher.hash("pw123456")?, hasher.hash("pw123456")?);
        Ok(())
    }

    #[test]
    fn wrong_password_is_mismatch() -> anyhow::Result<()> {
        let hasher = hasher();
        let hash = hasher.hash("pw123456")?;
        assert!(matches!(
            hasher.verify("pw1234567", &hash),
            Err(PasswordError::CredentialMismatch)
        ));
        Ok(())
    }

    #[test]
    fn decoy_never_matches_user_input() {
        let hasher = hasher();
        assert!(matches!(
            hasher.verify("pw123456", hasher.decoy_hash()),
            Err(PasswordError::CredentialMismatch)
        ));
    }

    #[test]
    fn malformed_hash_is_not_a_mismatch() {
        let hasher = hasher();
        assert!(matches!(
            hasher.verify("pw123456", "not-a-phc-string"),
            Err(PasswordError::Hash(_))
        ));
    }

    #[test]
    fn rejects_bad_params() {
        assert!(matches!(
            Argon2Hasher::with_params(1, 0, 0),
            Err(PasswordError::Params(_))
        ));
    }
}
