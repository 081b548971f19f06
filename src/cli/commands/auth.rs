use anyhow::bail;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::{password, Argon2Hasher, AuthConfig};

pub const ARG_BASE_URL: &str = "base-url";
pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_VERIFICATION_TTL: &str = "verification-ttl-seconds";
pub const ARG_RESET_TTL: &str = "reset-ttl-seconds";
pub const ARG_ACCESS_TTL: &str = "access-ttl-seconds";
pub const ARG_REFRESH_TTL: &str = "refresh-ttl-seconds";
pub const ARG_NOTIFY_TIMEOUT: &str = "notify-timeout-seconds";
pub const ARG_ARGON2_MEMORY: &str = "argon2-memory-kib";
pub const ARG_ARGON2_ITERATIONS: &str = "argon2-iterations";
pub const ARG_ARGON2_PARALLELISM: &str = "argon2-parallelism";

#[derive(Debug, Clone)]
pub struct Options {
    pub base_url: String,
    pub jwt_secret: SecretString,
    pub verification_ttl_seconds: i64,
    pub reset_ttl_seconds: i64,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub notify_timeout_seconds: u64,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

impl Options {
    /// Parse lifecycle arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing secret is missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let jwt_secret = match matches.get_one::<String>(ARG_JWT_SECRET) {
            Some(value) if !value.trim().is_empty() => SecretString::from(value.clone()),
            _ => bail!("missing required argument: --{ARG_JWT_SECRET}"),
        };

        let ttl = |id: &str| matches.get_one::<i64>(id).copied().unwrap_or_default();
        let cost = |id: &str, default: u32| matches.get_one::<u32>(id).copied().unwrap_or(default);

        Ok(Self {
            base_url: matches
                .get_one::<String>(ARG_BASE_URL)
                .cloned()
                .unwrap_or_default(),
            jwt_secret,
            verification_ttl_seconds: ttl(ARG_VERIFICATION_TTL),
            reset_ttl_seconds: ttl(ARG_RESET_TTL),
            access_ttl_seconds: ttl(ARG_ACCESS_TTL),
            refresh_ttl_seconds: ttl(ARG_REFRESH_TTL),
            notify_timeout_seconds: matches
                .get_one::<u64>(ARG_NOTIFY_TIMEOUT)
                .copied()
                .unwrap_or_default(),
            argon2_memory_kib: cost(ARG_ARGON2_MEMORY, password::DEFAULT_MEMORY_KIB),
            argon2_iterations: cost(ARG_ARGON2_ITERATIONS, password::DEFAULT_ITERATIONS),
            argon2_parallelism: cost(ARG_ARGON2_PARALLELISM, password::DEFAULT_PARALLELISM),
        })
    }

    /// Build and validate the lifecycle configuration.
    ///
    /// # Errors
    /// Returns an error if the base URL or any duration is rejected.
    pub fn auth_config(&self) -> anyhow::Result<AuthConfig> {
        let config = AuthConfig::new(self.base_url.clone())
            .with_verification_ttl_seconds(self.verification_ttl_seconds)
            .with_reset_ttl_seconds(self.reset_ttl_seconds)
            .with_access_ttl_seconds(self.access_ttl_seconds)
            .with_refresh_ttl_seconds(self.refresh_ttl_seconds)
            .with_notify_timeout_seconds(self.notify_timeout_seconds);
        config.validate()?;
        Ok(config)
    }

    /// Build the Argon2id hasher from the configured cost parameters.
    ///
    /// # Errors
    /// Returns an error if argon2 rejects the parameters.
    pub fn hasher(&self) -> anyhow::Result<Argon2Hasher> {
        Ok(Argon2Hasher::with_params(
            self.argon2_memory_kib,
            self.argon2_iterations,
            self.argon2_parallelism,
        )?)
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BASE_URL)
                .long(ARG_BASE_URL)
                .help("Base URL used for verification and reset links")
                .env("SESAME_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HS256 secret used to sign access and refresh tokens")
                .env("SESAME_JWT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_VERIFICATION_TTL)
                .long(ARG_VERIFICATION_TTL)
                .help("Email verification token TTL in seconds")
                .env("SESAME_VERIFICATION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_RESET_TTL)
                .long(ARG_RESET_TTL)
                .help("Password reset token TTL in seconds")
                .env("SESAME_RESET_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_ACCESS_TTL)
                .long(ARG_ACCESS_TTL)
                .help("Access token TTL in seconds")
                .env("SESAME_ACCESS_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL)
                .long(ARG_REFRESH_TTL)
                .help("Refresh token TTL in seconds")
                .env("SESAME_REFRESH_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_NOTIFY_TIMEOUT)
                .long(ARG_NOTIFY_TIMEOUT)
                .help("Upper bound in seconds for a single notification delivery")
                .env("SESAME_NOTIFY_TIMEOUT_SECONDS")
                .default_value("15")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_ARGON2_MEMORY)
                .long(ARG_ARGON2_MEMORY)
                .help("Argon2id memory cost in KiB")
                .env("SESAME_ARGON2_MEMORY_KIB")
                .default_value("19456")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_ARGON2_ITERATIONS)
                .long(ARG_ARGON2_ITERATIONS)
                .help("Argon2id iteration count")
                .env("SESAME_ARGON2_ITERATIONS")
                .default_value("2")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_ARGON2_PARALLELISM)
                .long(ARG_ARGON2_PARALLELISM)
                .help("Argon2id lane count")
                .env("SESAME_ARGON2_PARALLELISM")
                .default_value("1")
                .value_parser(clap::value_parser!(u32)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PasswordHasher;
    use secrecy::ExposeSecret;

    fn parse(args: &[&str]) -> anyhow::Result<Options> {
        let matches = with_args(Command::new("test")).try_get_matches_from(args)?;
        Options::parse(&matches)
    }

    #[test]
    fn test_defaults() -> anyhow::Result<()> {
        temp_env::with_vars(
            [
                ("SESAME_BASE_URL", None::<&str>),
                ("SESAME_JWT_SECRET", Some("secret")),
                ("SESAME_VERIFICATION_TTL_SECONDS", None),
                ("SESAME_RESET_TTL_SECONDS", None),
                ("SESAME_ACCESS_TTL_SECONDS", None),
                ("SESAME_REFRESH_TTL_SECONDS", None),
                ("SESAME_NOTIFY_TIMEOUT_SECONDS", None),
                ("SESAME_ARGON2_MEMORY_KIB", None),
                ("SESAME_ARGON2_ITERATIONS", None),
                ("SESAME_ARGON2_PARALLELISM", None),
            ],
            || {
                let options = parse(&["test"])?;
                assert_eq!(options.base_url, "http://localhost:8080");
                assert_eq!(options.jwt_secret.expose_secret(), "secret");
                assert_eq!(options.verification_ttl_seconds, 86_400);
                assert_eq!(options.reset_ttl_seconds, 900);
                assert_eq!(options.access_ttl_seconds, 900);
                assert_eq!(options.refresh_ttl_seconds, 604_800);
                assert_eq!(options.notify_timeout_seconds, 15);

                let config = options.auth_config()?;
                assert_eq!(config.reset_ttl(), chrono::Duration::minutes(15));

                assert_eq!(options.argon2_memory_kib, password::DEFAULT_MEMORY_KIB);
                assert_eq!(options.argon2_iterations, password::DEFAULT_ITERATIONS);
                assert_eq!(options.argon2_parallelism, password::DEFAULT_PARALLELISM);
                options.hasher()?;
                Ok(())
            },
        )
    }

    #[test]
    fn test_missing_secret() {
        temp_env::with_var("SESAME_JWT_SECRET", None::<&str>, || {
            assert!(parse(&["test"]).is_err());
            assert!(parse(&["test", "--jwt-secret", "  "]).is_err());
        });
    }

    #[test]
    fn test_rejects_invalid_config() -> anyhow::Result<()> {
        let options = parse(&[
            "test",
            "--jwt-secret",
            "secret",
            "--base-url",
            "ftp://sesame.dev",
        ])?;
        assert!(options.auth_config().is_err());

        let options = parse(&[
            "test",
            "--jwt-secret",
            "secret",
            "--access-ttl-seconds",
            "0",
        ])?;
        assert!(options.auth_config().is_err());
        Ok(())
    }

    #[test]
    fn test_argon2_params() -> anyhow::Result<()> {
        temp_env::with_vars(
            [
                ("SESAME_JWT_SECRET", Some("secret")),
                ("SESAME_ARGON2_MEMORY_KIB", Some("4096")),
                ("SESAME_ARGON2_ITERATIONS", None),
                ("SESAME_ARGON2_PARALLELISM", None),
            ],
            || {
                let options = parse(&["test", "--argon2-iterations", "3"])?;
                assert_eq!(options.argon2_memory_kib, 4096);
                assert_eq!(options.argon2_iterations, 3);
                assert_eq!(options.argon2_parallelism, 1);

                let hash = options.hasher()?.hash("pw123456")?;
                assert!(hash.contains("m=4096,t=3,p=1"));

                let options = parse(&["test", "--argon2-memory-kib", "1"])?;
                assert!(options.hasher().is_err());
                Ok(())
            },
        )
    }
}
