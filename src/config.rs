//! Process configuration read from the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BIND_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 30;
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_DEGRADED_LATENCY_MS: u64 = 1_000;
const DEFAULT_RECORD_RETENTION_DAYS: u32 = 30;

/// Errors raised while reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Parse failure.
        reason: String,
    },
}

/// Gateway process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// HTTP listen address.
    pub bind_addr: SocketAddr,
    /// Default `tracing` filter directive.
    pub log_level: String,
    /// Interval between health sweeps.
    pub health_interval: Duration,
    /// Upper bound for one health probe.
    pub probe_timeout: Duration,
    /// Probe latency above which a server is reported degraded.
    pub degraded_latency: Duration,
    /// Days execution records are kept before pruning.
    pub record_retention_days: u32,
    /// Postgres connection string; in-memory stores are used when absent.
    pub database_url: Option<String>,
}

impl GatewayConfig {
    /// Loads configuration from the process environment, reading `.env`
    /// first when present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unparsable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, applying defaults for unset
    /// or blank keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_owned())
                .filter(|raw| !raw.is_empty())
        };

        let bind_addr = parse(
            "GATEWAY_BIND_ADDR",
            value("GATEWAY_BIND_ADDR"),
            DEFAULT_BIND_ADDR,
        )?;
        let health_interval_secs: u64 = parse(
            "GATEWAY_HEALTH_INTERVAL_SECS",
            value("GATEWAY_HEALTH_INTERVAL_SECS"),
            DEFAULT_HEALTH_INTERVAL_SECS,
        )?;
        if health_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "GATEWAY_HEALTH_INTERVAL_SECS",
                value: "0".to_owned(),
                reason: "interval must be positive".to_owned(),
            });
        }
        let probe_timeout_ms: u64 = parse(
            "GATEWAY_PROBE_TIMEOUT_MS",
            value("GATEWAY_PROBE_TIMEOUT_MS"),
            DEFAULT_PROBE_TIMEOUT_MS,
        )?;
        let degraded_latency_ms: u64 = parse(
            "GATEWAY_DEGRADED_LATENCY_MS",
            value("GATEWAY_DEGRADED_LATENCY_MS"),
            DEFAULT_DEGRADED_LATENCY_MS,
        )?;
        let record_retention_days = parse(
            "GATEWAY_RECORD_RETENTION_DAYS",
            value("GATEWAY_RECORD_RETENTION_DAYS"),
            DEFAULT_RECORD_RETENTION_DAYS,
        )?;

        Ok(Self {
            bind_addr,
            log_level: value("GATEWAY_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned()),
            health_interval: Duration::from_secs(health_interval_secs),
            probe_timeout: Duration::from_millis(probe_timeout_ms),
            degraded_latency: Duration::from_millis(degraded_latency_ms),
            record_retention_days,
            database_url: value("DATABASE_URL"),
        })
    }
}

fn parse<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    raw.parse().map_err(|err: T::Err| ConfigError::Invalid {
        key,
        reason: err.to_string(),
        value: raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = GatewayConfig::from_lookup(lookup(&[])).expect("defaults are valid");

        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.health_interval, Duration::from_secs(30));
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.record_retention_days, 30);
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("GATEWAY_BIND_ADDR", "0.0.0.0:9090"),
            ("GATEWAY_LOG_LEVEL", "tool_gateway=debug"),
            ("GATEWAY_HEALTH_INTERVAL_SECS", "10"),
            ("GATEWAY_PROBE_TIMEOUT_MS", "250"),
            ("GATEWAY_DEGRADED_LATENCY_MS", "400"),
            ("GATEWAY_RECORD_RETENTION_DAYS", "7"),
            ("DATABASE_URL", "postgres://gateway@localhost/gateway"),
        ]))
        .expect("valid configuration");

        assert_eq!(config.bind_addr.port(), 9090);
        assert_eq!(config.log_level, "tool_gateway=debug");
        assert_eq!(config.health_interval, Duration::from_secs(10));
        assert_eq!(config.probe_timeout, Duration::from_millis(250));
        assert_eq!(config.degraded_latency, Duration::from_millis(400));
        assert_eq!(config.record_retention_days, 7);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://gateway@localhost/gateway")
        );
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")]))
            .expect("valid configuration");
        assert_eq!(config.database_url, None);
    }

    #[rstest]
    #[case("GATEWAY_BIND_ADDR", "localhost")]
    #[case("GATEWAY_HEALTH_INTERVAL_SECS", "soon")]
    #[case("GATEWAY_HEALTH_INTERVAL_SECS", "0")]
    #[case("GATEWAY_PROBE_TIMEOUT_MS", "-5")]
    #[case("GATEWAY_RECORD_RETENTION_DAYS", "forever")]
    fn invalid_values_are_rejected(#[case] key: &'static str, #[case] value: &str) {
        let result = GatewayConfig::from_lookup(lookup(&[(key, value)]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { key: rejected, .. }) if rejected == key
        ));
    }
}
