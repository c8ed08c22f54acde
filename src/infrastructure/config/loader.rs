//! Figment-backed configuration loading and validation.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::domain::models::Credential;

/// Comma-separated credential list, resolved after the figment merge.
pub const CREDENTIALS_ENV: &str = "PILOT_CREDENTIALS";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `session.max_challenge_attempts` is zero.
    #[error("Invalid max_challenge_attempts: {0}. Must be at least 1")]
    InvalidMaxAttempts(u32),

    /// A timeout is zero.
    #[error("Invalid {field}: must be greater than zero")]
    ZeroTimeout {
        /// Dotted name of the offending field.
        field: &'static str,
    },

    /// `ledger.reset_hour_utc` is not an hour.
    #[error("Invalid reset_hour_utc: {0}. Must be between 0 and 23")]
    InvalidResetHour(u32),

    /// `ledger.fingerprint_len` is outside 8..=64.
    #[error("Invalid fingerprint_len: {0}. Must be between 8 and 64")]
    InvalidFingerprintLen(usize),

    /// `rotation.models` is empty.
    #[error("Model priority list cannot be empty")]
    NoModels,

    /// `rotation.cycles` is zero.
    #[error("Invalid cycles: {0}. Must be at least 1")]
    InvalidCycles(u32),

    /// `ledger.path` is empty.
    #[error("Ledger path cannot be empty")]
    EmptyLedgerPath,

    /// `ledger.max_connections` is zero.
    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    /// Unknown `logging.level`.
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Unknown `logging.format`.
    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// Unknown `logging.rotation`.
    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    /// Any other invalid value.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .pilot/config.yaml
    /// 3. .pilot/local.yaml (optional overrides)
    /// 4. Environment variables (PILOT_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".pilot/config.yaml"))
            .merge(Yaml::file(".pilot/local.yaml"))
            .merge(Env::prefixed("PILOT_").split("__"));
        Self::finish(figment, "Failed to extract configuration from figment")
    }

    /// Load configuration from a specific file, still honouring environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("PILOT_").split("__"));
        Self::finish(figment, &format!("Failed to load config from {}", path.display()))
    }

    fn finish(figment: Figment, context: &str) -> Result<Config> {
        let mut config: Config = figment.extract().with_context(|| context.to_string())?;
        Self::resolve_credentials(&mut config);
        Self::validate(&config)?;
        Ok(config)
    }

    /// Replace configured credentials with `PILOT_CREDENTIALS`, when set.
    pub fn resolve_credentials(config: &mut Config) {
        let Ok(raw) = std::env::var(CREDENTIALS_ENV) else {
            return;
        };
        let credentials: Vec<Credential> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Credential::new)
            .collect();
        if !credentials.is_empty() {
            config.rotation.credentials = credentials;
        }
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let session = &config.session;
        if session.max_challenge_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(session.max_challenge_attempts));
        }
        for (field, value) in [
            ("execution_timeout_secs", session.execution_timeout_secs),
            ("response_timeout_secs", session.response_timeout_secs),
            ("dispatch_timeout_secs", session.dispatch_timeout_secs),
            ("payload_wait_secs", session.payload_wait_secs),
            ("ignore_check_secs", session.ignore_check_secs),
            ("request_timeout_secs", config.provider.request_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroTimeout { field });
            }
        }

        if config.rotation.models.is_empty() || config.rotation.models.iter().any(String::is_empty) {
            return Err(ConfigError::NoModels);
        }
        if config.rotation.cycles == 0 {
            return Err(ConfigError::InvalidCycles(config.rotation.cycles));
        }

        let ledger = &config.ledger;
        if ledger.path.is_empty() {
            return Err(ConfigError::EmptyLedgerPath);
        }
        if ledger.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(ledger.max_connections));
        }
        if ledger.reset_hour_utc > 23 {
            return Err(ConfigError::InvalidResetHour(ledger.reset_hour_utc));
        }
        if !(8..=64).contains(&ledger.fingerprint_len) {
            return Err(ConfigError::InvalidFingerprintLen(ledger.fingerprint_len));
        }

        if config.provider.base_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "provider base_url cannot be empty".to_string(),
            ));
        }

        let interceptor = &config.interceptor;
        for (name, pattern) in [
            ("bootstrap_suffix", &interceptor.bootstrap_suffix),
            ("payload_pattern", &interceptor.payload_pattern),
            ("verdict_pattern", &interceptor.verdict_pattern),
        ] {
            if pattern.is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "interceptor {name} cannot be empty"
                )));
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}
