//! Small helpers for input validation, link building and action token digests.

use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

use super::error::AuthError;

const MIN_PASSWORD_CHARS: usize = 8;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Usernames are 3 to 30 ASCII alphanumerics.
pub(crate) fn valid_username(username: &str) -> bool {
    (3..=30).contains(&username.len()) && username.chars().all(|c| c.is_ascii_alphanumeric())
}

pub(crate) fn check_email(email_normalized: &str) -> Result<(), AuthError> {
    if valid_email(email_normalized) {
        Ok(())
    } else {
        Err(AuthError::Validation("email"))
    }
}

pub(crate) fn check_username(username: &str) -> Result<(), AuthError> {
    if valid_username(username) {
        Ok(())
    } else {
        Err(AuthError::Validation("username must be 3-30 alphanumeric characters"))
    }
}

pub(crate) fn check_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() >= MIN_PASSWORD_CHARS {
        Ok(())
    } else {
        Err(AuthError::Validation("password must be at least 8 characters"))
    }
}

/// Digest an action token so the raw value never reaches the store.
pub(crate) fn hash_action_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Build an outbound link: base URL + path, with the token as a query parameter.
pub(crate) fn build_action_url(base_url: &str, path: &str, token: &str) -> anyhow::Result<String> {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let mut url = Url::parse(&format!("{base}/{path}"))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn username_rules() {
        assert!(valid_username("alice"));
        assert!(valid_username("bob42"));
        assert!(!valid_username("al"));
        assert!(!valid_username("alice_smith"));
        assert!(!valid_username(&"a".repeat(31)));
    }

    #[test]
    fn password_length() {
        assert!(check_password("pw123456").is_ok());
        assert!(matches!(
            check_password("short"),
            Err(AuthError::Validation(_))
        ));
    }

    #[test]
    fn hash_action_token_stable() {
        let first = hash_action_token("token");
        let second = hash_action_token("token");
        let different = hash_action_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn build_action_url_joins_and_encodes() -> anyhow::Result<()> {
        let url = build_action_url("https://sesame.dev/", "/reset-password", "abc-_123")?;
        assert_eq!(url, "https://sesame.dev/reset-password?token=abc-_123");

        let url = build_action_url("http://localhost:8080", "api/v1/auth/verify-email", "a+b")?;
        assert_eq!(
            url,
            "http://localhost:8080/api/v1/auth/verify-email?token=a%2Bb"
        );
        Ok(())
    }
}
