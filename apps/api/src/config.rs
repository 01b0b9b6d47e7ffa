use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::broker::BrokerSettings;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or unparseable.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    /// Access token for hosted Redis; replaces any password in `redis_url`.
    pub redis_token: Option<String>,
    pub request_timeout_secs: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    /// Zero disables the reply-subscription heartbeat.
    pub heartbeat_secs: u64,
    pub fan_out_concurrency: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let config = Config {
            redis_url: require_env("REDIS_URL")?,
            redis_token: std::env::var("REDIS_TOKEN").ok().filter(|t| !t.is_empty()),
            request_timeout_secs: parse_env("BROKER_REQUEST_TIMEOUT_SECS", 30)?,
            reconnect_base_ms: parse_env("BROKER_RECONNECT_BASE_MS", 500)?,
            reconnect_max_ms: parse_env("BROKER_RECONNECT_MAX_MS", 30_000)?,
            heartbeat_secs: parse_env("BROKER_HEARTBEAT_SECS", 15)?,
            fan_out_concurrency: parse_env("BROKER_FAN_OUT_CONCURRENCY", 8)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };

        anyhow::ensure!(
            config.request_timeout_secs > 0,
            "BROKER_REQUEST_TIMEOUT_SECS must be greater than zero"
        );
        anyhow::ensure!(
            config.reconnect_base_ms <= config.reconnect_max_ms,
            "BROKER_RECONNECT_BASE_MS must not exceed BROKER_RECONNECT_MAX_MS"
        );

        Ok(config)
    }

    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            reconnect_base: Duration::from_millis(self.reconnect_base_ms),
            reconnect_max: Duration::from_millis(self.reconnect_max_ms),
            heartbeat_interval: (self.heartbeat_secs > 0)
                .then(|| Duration::from_secs(self.heartbeat_secs)),
            fan_out_concurrency: self.fan_out_concurrency.max(1),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_falls_back_to_default() {
        assert_eq!(parse_env::<u64>("HIREWIRE_TEST_UNSET_VAR", 42).unwrap(), 42);
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        std::env::set_var("HIREWIRE_TEST_BAD_PORT", "eighty");
        let err = parse_env::<u16>("HIREWIRE_TEST_BAD_PORT", 8080).unwrap_err();
        assert!(err.to_string().contains("HIREWIRE_TEST_BAD_PORT"));
    }

    #[test]
    fn test_broker_settings_converts_units() {
        let config = Config {
            redis_url: "redis://localhost".to_string(),
            redis_token: None,
            request_timeout_secs: 45,
            reconnect_base_ms: 250,
            reconnect_max_ms: 10_000,
            heartbeat_secs: 20,
            fan_out_concurrency: 0,
            port: 8080,
            rust_log: "info".to_string(),
        };
        let settings = config.broker_settings();
        assert_eq!(settings.request_timeout, Duration::from_secs(45));
        assert_eq!(settings.reconnect_base, Duration::from_millis(250));
        assert_eq!(settings.reconnect_max, Duration::from_secs(10));
        assert_eq!(settings.heartbeat_interval, Some(Duration::from_secs(20)));
        assert_eq!(settings.fan_out_concurrency, 1);

        let disabled = Config {
            heartbeat_secs: 0,
            ..config
        };
        assert_eq!(disabled.broker_settings().heartbeat_interval, None);
    }
}
