//! Engine configuration loaded from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use common::RetryConfig;
use domain::HandlerConfig;
use event_bus::{BusConfig, RelayConfig};
use projections::QueryConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Engine configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `METRICS_ADDR`: Prometheus listener address, disabled when unset
/// - `ENGINE_OPERATION_TIMEOUT_MS`: write repository deadline (default: 2000)
/// - `ENGINE_CONFLICT_RETRIES`: command retries on version conflicts (default: 3)
/// - `ENGINE_DELIVERY_MAX_ATTEMPTS`: deliveries before dead-lettering (default: 5)
/// - `ENGINE_DELIVERY_INITIAL_DELAY_MS` (default: 50)
/// - `ENGINE_DELIVERY_MAX_DELAY_MS` (default: 2000)
/// - `ENGINE_BUS_PARTITIONS` (default: 4)
/// - `ENGINE_BUS_CAPACITY`: per-partition queue length (default: 1024)
/// - `ENGINE_OUTBOX_POLL_MS` (default: 100)
/// - `ENGINE_OUTBOX_BATCH` (default: 256)
/// - `ENGINE_READ_WAIT_MS`: bounded wait for `minVersion` queries (default: 1000)
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_addr: Option<SocketAddr>,
    pub operation_timeout: Duration,
    pub conflict_retries: u32,
    pub delivery_max_attempts: u32,
    pub delivery_initial_delay: Duration,
    pub delivery_max_delay: Duration,
    pub bus_partitions: usize,
    pub bus_capacity: usize,
    pub outbox_poll: Duration,
    pub outbox_batch: usize,
    pub read_wait: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup. Unparsable values fall back
    /// to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            parse(&lookup, key)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            metrics_addr: parse(&lookup, "METRICS_ADDR"),
            operation_timeout: millis("ENGINE_OPERATION_TIMEOUT_MS", defaults.operation_timeout),
            conflict_retries: parse(&lookup, "ENGINE_CONFLICT_RETRIES")
                .unwrap_or(defaults.conflict_retries),
            delivery_max_attempts: parse(&lookup, "ENGINE_DELIVERY_MAX_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.delivery_max_attempts),
            delivery_initial_delay: millis(
                "ENGINE_DELIVERY_INITIAL_DELAY_MS",
                defaults.delivery_initial_delay,
            ),
            delivery_max_delay: millis("ENGINE_DELIVERY_MAX_DELAY_MS", defaults.delivery_max_delay),
            bus_partitions: parse(&lookup, "ENGINE_BUS_PARTITIONS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.bus_partitions),
            bus_capacity: parse(&lookup, "ENGINE_BUS_CAPACITY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.bus_capacity),
            outbox_poll: millis("ENGINE_OUTBOX_POLL_MS", defaults.outbox_poll),
            outbox_batch: parse(&lookup, "ENGINE_OUTBOX_BATCH")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.outbox_batch),
            read_wait: millis("ENGINE_READ_WAIT_MS", defaults.read_wait),
        }
    }

    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            max_conflict_retries: self.conflict_retries,
            operation_timeout: self.operation_timeout,
            ..HandlerConfig::default()
        }
    }

    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            partitions: self.bus_partitions,
            channel_capacity: self.bus_capacity,
            delivery_retry: RetryConfig {
                max_attempts: self.delivery_max_attempts,
                initial_delay: self.delivery_initial_delay,
                max_delay: self.delivery_max_delay,
                multiplier: 2.0,
            },
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            batch_size: self.outbox_batch,
            poll_interval: self.outbox_poll,
            publish_timeout: self.operation_timeout,
        }
    }

    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            read_wait_timeout: self.read_wait,
            ..QueryConfig::default()
        }
    }
}

fn parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_addr: None,
            operation_timeout: Duration::from_millis(2000),
            conflict_retries: 3,
            delivery_max_attempts: 5,
            delivery_initial_delay: Duration::from_millis(50),
            delivery_max_delay: Duration::from_millis(2000),
            bus_partitions: 4,
            bus_capacity: 1024,
            outbox_poll: Duration::from_millis(100),
            outbox_batch: 256,
            read_wait: Duration::from_millis(1000),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.metrics_addr.is_none());
        assert_eq!(config.operation_timeout, Duration::from_secs(2));
        assert_eq!(config.conflict_retries, 3);
        assert_eq!(config.delivery_max_attempts, 5);
        assert_eq!(config.bus_partitions, 4);
        assert_eq!(config.read_wait, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("LOG_FORMAT", "JSON"),
            ("METRICS_ADDR", "127.0.0.1:9000"),
            ("ENGINE_OPERATION_TIMEOUT_MS", "500"),
            ("ENGINE_CONFLICT_RETRIES", "0"),
            ("ENGINE_BUS_PARTITIONS", "8"),
        ]));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.metrics_addr, Some("127.0.0.1:9000".parse().unwrap()));
        assert_eq!(config.operation_timeout, Duration::from_millis(500));
        assert_eq!(config.conflict_retries, 0);
        assert_eq!(config.bus_partitions, 8);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("ENGINE_BUS_PARTITIONS", "0"),
            ("ENGINE_OUTBOX_BATCH", "lots"),
            ("METRICS_ADDR", "not an address"),
        ]));
        assert_eq!(config.bus_partitions, 4);
        assert_eq!(config.outbox_batch, 256);
        assert!(config.metrics_addr.is_none());
    }

    #[test]
    fn test_component_configs() {
        let config = Config::default();
        assert_eq!(config.bus_config().delivery_retry.max_attempts, 5);
        assert_eq!(config.relay_config().publish_timeout, config.operation_timeout);
        assert_eq!(config.handler_config().max_conflict_retries, 3);
        assert_eq!(config.query_config().read_wait_timeout, Duration::from_secs(1));
    }
}
