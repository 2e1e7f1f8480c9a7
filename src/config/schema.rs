//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the session relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Circuit breaker guarding the connection handshake.
    pub breaker: CircuitBreakerConfig,

    /// In-process event bus settings.
    pub event_bus: EventBusConfig,

    /// Realtime connection settings (endpoint, reconnect, heartbeat).
    pub connection: ConnectionConfig,

    /// Outbound update throttling and offline queueing.
    pub broadcaster: BroadcasterConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Circuit breaker configuration. Immutable per breaker instance.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Breaker identifier for logging/metrics.
    pub name: String,

    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,

    /// Failure rate (0-100) at which the circuit opens.
    pub error_threshold_percentage: f64,

    /// Time spent open before a trial call is allowed, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Length of the rolling statistics window in milliseconds.
    pub rolling_window_ms: u64,

    /// Number of buckets the rolling window is split into.
    pub rolling_buckets: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "handshake".to_string(),
            timeout_ms: 10_000,
            error_threshold_percentage: 50.0,
            reset_timeout_ms: 30_000,
            rolling_window_ms: 10_000,
            rolling_buckets: 10,
        }
    }
}

/// Event bus construction options.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EventBusConfig {
    /// Log every emission at debug level.
    pub enable_logging: bool,

    /// Dispatch handlers concurrently and isolate their failures.
    pub async_mode: bool,

    /// Listener count per event type above which a leak warning is logged.
    pub max_listeners: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            enable_logging: true,
            async_mode: true,
            max_listeners: 100,
        }
    }
}

/// Realtime connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// WebSocket endpoint (ws:// or wss://).
    pub url: String,

    /// Base delay for exponential reconnect backoff in milliseconds.
    pub reconnect_base_ms: u64,

    /// Maximum reconnect delay in milliseconds.
    pub reconnect_max_ms: u64,

    /// Jitter as a fraction of the delay (0.1 = up to 10%).
    pub jitter_ratio: f64,

    /// Give up and stay disconnected after this many consecutive attempts.
    pub max_reconnect_attempts: Option<u32>,

    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,

    /// Heartbeat round-trip timeout in milliseconds.
    pub heartbeat_timeout_ms: u64,

    /// Consecutive missed heartbeats treated as a dropped connection.
    pub max_missed_heartbeats: u32,

    /// Number of heartbeat samples the quality rating is derived from.
    pub quality_window: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9001/live".to_string(),
            reconnect_base_ms: 1000,
            reconnect_max_ms: 30_000,
            jitter_ratio: 0.1,
            max_reconnect_attempts: None,
            heartbeat_interval_ms: 15_000,
            heartbeat_timeout_ms: 5000,
            max_missed_heartbeats: 2,
            quality_window: 10,
        }
    }
}

/// Broadcaster configuration. Hot-reloadable.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BroadcasterConfig {
    /// Disabled broadcasters drop every update.
    pub enabled: bool,

    /// Minimum spacing between transmissions of one stream, in milliseconds.
    pub throttle_ms: u64,

    /// Offline queue cap per stream; the oldest entry is evicted on overflow.
    pub max_queue_per_stream: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            throttle_ms: 1000,
            max_queue_per_stream: 500,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = RelayConfig::default();
        assert_eq!(config.breaker.timeout_ms, 10_000);
        assert_eq!(config.breaker.error_threshold_percentage, 50.0);
        assert_eq!(config.breaker.reset_timeout_ms, 30_000);
        assert_eq!(config.breaker.rolling_buckets, 10);
        assert!(config.event_bus.async_mode);
        assert_eq!(config.event_bus.max_listeners, 100);
        assert!(config.broadcaster.enabled);
        assert_eq!(config.connection.max_reconnect_attempts, None);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [broadcaster]
            throttle_ms = 250

            [connection]
            url = "wss://live.example.com/sessions"
            max_reconnect_attempts = 8

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.broadcaster.throttle_ms, 250);
        assert_eq!(config.broadcaster.max_queue_per_stream, 500);
        assert_eq!(config.connection.url, "wss://live.example.com/sessions");
        assert_eq!(config.connection.max_reconnect_attempts, Some(8));
        assert_eq!(config.connection.reconnect_base_ms, 1000);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.breaker, CircuitBreakerConfig::default());
    }
}
