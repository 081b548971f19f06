//! Lifecycle configuration: link targets, token lifetimes and collaborator timeouts.

use chrono::Duration;
use std::time::Duration as StdDuration;
use thiserror::Error;
use url::Url;

const DEFAULT_VERIFY_PATH: &str = "/api/v1/auth/verify-email";
const DEFAULT_RESET_PATH: &str = "/reset-password";
const DEFAULT_VERIFICATION_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_RESET_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 168 * 60 * 60;
const DEFAULT_NOTIFY_TIMEOUT_SECONDS: u64 = 15;
const DEFAULT_ISSUER: &str = "sesame";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid base url: {0}")]
    BaseUrl(String),
    #[error("{0} must be greater than zero")]
    NonPositive(&'static str),
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    base_url: String,
    verify_path: String,
    reset_path: String,
    verification_ttl_seconds: i64,
    reset_ttl_seconds: i64,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    notify_timeout_seconds: u64,
    issuer: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            verify_path: DEFAULT_VERIFY_PATH.to_string(),
            reset_path: DEFAULT_RESET_PATH.to_string(),
            verification_ttl_seconds: DEFAULT_VERIFICATION_TTL_SECONDS,
            reset_ttl_seconds: DEFAULT_RESET_TTL_SECONDS,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            notify_timeout_seconds: DEFAULT_NOTIFY_TIMEOUT_SECONDS,
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    #[must_use]
    pub fn with_verify_path(mut self, path: String) -> Self {
        self.verify_path = path;
        self
    }

    #[must_use]
    pub fn with_reset_path(mut self, path: String) -> Self {
        self.reset_path = path;
        self
    }

    #[must_use]
    pub fn with_verification_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_notify_timeout_seconds(mut self, seconds: u64) -> Self {
        self.notify_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    /// Reject configurations that would produce unusable links or tokens.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] naming the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| ConfigError::BaseUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::BaseUrl(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }

        let ttls = [
            ("verification ttl", self.verification_ttl_seconds),
            ("reset ttl", self.reset_ttl_seconds),
            ("access ttl", self.access_ttl_seconds),
            ("refresh ttl", self.refresh_ttl_seconds),
        ];
        if let Some((name, _)) = ttls.into_iter().find(|(_, seconds)| *seconds <= 0) {
            return Err(ConfigError::NonPositive(name));
        }

        if self.notify_timeout_seconds == 0 {
            return Err(ConfigError::NonPositive("notify timeout"));
        }

        Ok(())
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn verify_path(&self) -> &str {
        &self.verify_path
    }

    #[must_use]
    pub fn reset_path(&self) -> &str {
        &self.reset_path
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn verification_ttl(&self) -> Duration {
        Duration::seconds(self.verification_ttl_seconds)
    }

    #[must_use]
    pub fn reset_ttl(&self) -> Duration {
        Duration::seconds(self.reset_ttl_seconds)
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        Duration::seconds(self.access_ttl_seconds)
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_ttl_seconds)
    }

    #[must_use]
    pub fn notify_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.notify_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AuthConfig::new("https://sesame.dev".to_string());
        assert_eq!(config.verification_ttl(), Duration::hours(24));
        assert_eq!(config.reset_ttl(), Duration::minutes(15));
        assert_eq!(config.access_ttl(), Duration::minutes(15));
        assert_eq!(config.refresh_ttl(), Duration::hours(168));
        assert_eq!(config.notify_timeout(), StdDuration::from_secs(15));
        assert_eq!(config.issuer(), "sesame");
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn builder_overrides() {
        let config = AuthConfig::new("https://sesame.dev".to_string())
            .with_reset_ttl_seconds(60)
            .with_notify_timeout_seconds(3)
            .with_issuer("test".to_string());
        assert_eq!(config.reset_ttl(), Duration::seconds(60));
        assert_eq!(config.notify_timeout(), StdDuration::from_secs(3));
        assert_eq!(config.issuer(), "test");
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let config = AuthConfig::new("ftp://sesame.dev".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::BaseUrl(_))));

        let config = AuthConfig::new("not a url".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::BaseUrl(_))));
    }

    #[test]
    fn validate_rejects_non_positive_values() {
        let config = AuthConfig::new("https://sesame.dev".to_string()).with_access_ttl_seconds(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositive("access ttl"))
        );

        let config =
            AuthConfig::new("https://sesame.dev".to_string()).with_notify_timeout_seconds(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositive("notify timeout"))
        );
    }
}
