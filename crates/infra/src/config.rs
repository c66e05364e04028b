//! Runtime configuration from environment variables.
//!
//! | Variable                          | Default |
//! |-----------------------------------|---------|
//! | `DATABASE_URL`                    | unset   |
//! | `ORDERDESK_DB_MAX_CONNECTIONS`    | 10      |
//! | `ORDERDESK_LOCK_TIMEOUT_MS`       | 5000    |
//! | `ORDERDESK_RETRY_MAX_ATTEMPTS`    | 3       |
//! | `ORDERDESK_RETRY_BASE_DELAY_MS`   | 20      |
//! | `ORDERDESK_RETRY_MAX_DELAY_MS`    | 500     |
//! | `ORDERDESK_LOG_FORMAT`            | json    |
//! | `RUST_LOG`                        | info    |

use core::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use orderdesk_observability::LogFormat;

use crate::retry::RetryPolicy;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "ORDERDESK_DB_MAX_CONNECTIONS";
pub const LOCK_TIMEOUT_MS: &str = "ORDERDESK_LOCK_TIMEOUT_MS";
pub const RETRY_MAX_ATTEMPTS: &str = "ORDERDESK_RETRY_MAX_ATTEMPTS";
pub const RETRY_BASE_DELAY_MS: &str = "ORDERDESK_RETRY_BASE_DELAY_MS";
pub const RETRY_MAX_DELAY_MS: &str = "ORDERDESK_RETRY_MAX_DELAY_MS";
pub const LOG_FORMAT: &str = "ORDERDESK_LOG_FORMAT";
pub const LOG_FILTER: &str = "RUST_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} is not set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub lock_timeout: Duration,
    pub retry: RetryPolicy,
    pub log_format: LogFormat,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            lock_timeout: Duration::from_millis(5_000),
            retry: RetryPolicy::default(),
            log_format: LogFormat::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unset or blank keys fall back to
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let max_connections = parse_or(&get, DB_MAX_CONNECTIONS, defaults.max_connections)?;
        if max_connections == 0 {
            return Err(invalid(DB_MAX_CONNECTIONS, "0", "must be at least 1"));
        }

        let lock_timeout_ms = parse_or(
            &get,
            LOCK_TIMEOUT_MS,
            defaults.lock_timeout.as_millis() as u64,
        )?;

        let max_attempts = parse_or(&get, RETRY_MAX_ATTEMPTS, defaults.retry.max_attempts)?;
        if max_attempts == 0 {
            return Err(invalid(RETRY_MAX_ATTEMPTS, "0", "must be at least 1"));
        }
        let base_delay_ms = parse_or(
            &get,
            RETRY_BASE_DELAY_MS,
            defaults.retry.base_delay.as_millis() as u64,
        )?;
        let max_delay_ms = parse_or(
            &get,
            RETRY_MAX_DELAY_MS,
            defaults.retry.max_delay.as_millis() as u64,
        )?;
        if max_delay_ms < base_delay_ms {
            return Err(invalid(
                RETRY_MAX_DELAY_MS,
                &max_delay_ms.to_string(),
                "must not be below the base delay",
            ));
        }

        let log_format = match get(LOG_FORMAT) {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|e| invalid(LOG_FORMAT, &raw, &e.to_string()))?,
            None => defaults.log_format,
        };

        Ok(Self {
            database_url: get(DATABASE_URL),
            max_connections,
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            retry: RetryPolicy::exponential(
                max_attempts,
                Duration::from_millis(base_delay_ms),
                Duration::from_millis(max_delay_ms),
            ),
            log_format,
            log_filter: get(LOG_FILTER).unwrap_or(defaults.log_filter),
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing(DATABASE_URL))
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &raw, &e.to_string())),
        None => Ok(default),
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.require_database_url(), Err(ConfigError::Missing(DATABASE_URL)));
    }

    #[test]
    fn reads_every_variable() {
        let config = AppConfig::from_lookup(lookup(&[
            (DATABASE_URL, "postgres://localhost/orderdesk"),
            (DB_MAX_CONNECTIONS, "4"),
            (LOCK_TIMEOUT_MS, "250"),
            (RETRY_MAX_ATTEMPTS, "5"),
            (RETRY_BASE_DELAY_MS, "10"),
            (RETRY_MAX_DELAY_MS, "80"),
            (LOG_FORMAT, "pretty"),
            (LOG_FILTER, "orderdesk=debug"),
        ]))
        .unwrap();

        assert_eq!(config.require_database_url(), Ok("postgres://localhost/orderdesk"));
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(10));
        assert_eq!(config.retry.max_delay, Duration::from_millis(80));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.log_filter, "orderdesk=debug");
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config =
            AppConfig::from_lookup(lookup(&[(DATABASE_URL, "  "), (DB_MAX_CONNECTIONS, "")]))
                .unwrap();
        assert_eq!(config.database_url, None);
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    fn rejects_malformed_values() {
        let err = AppConfig::from_lookup(lookup(&[(LOCK_TIMEOUT_MS, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: LOCK_TIMEOUT_MS, .. }));

        let err = AppConfig::from_lookup(lookup(&[(RETRY_MAX_ATTEMPTS, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: RETRY_MAX_ATTEMPTS, .. }));

        let err = AppConfig::from_lookup(lookup(&[(LOG_FORMAT, "xml")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: LOG_FORMAT, .. }));

        let err = AppConfig::from_lookup(lookup(&[
            (RETRY_BASE_DELAY_MS, "100"),
            (RETRY_MAX_DELAY_MS, "50"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: RETRY_MAX_DELAY_MS, .. }));
    }
}
