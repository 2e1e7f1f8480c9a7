//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, percentages in range)
//! - Validate the realtime endpoint URL
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::RelayConfig;

/// A single semantic violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let breaker = &config.breaker;
    if breaker.name.trim().is_empty() {
        errors.push(ValidationError::new("breaker.name", "must not be empty"));
    }
    if breaker.timeout_ms == 0 {
        errors.push(ValidationError::new("breaker.timeout_ms", "must be greater than 0"));
    }
    if !(breaker.error_threshold_percentage > 0.0 && breaker.error_threshold_percentage <= 100.0) {
        errors.push(ValidationError::new(
            "breaker.error_threshold_percentage",
            "must be within (0, 100]",
        ));
    }
    if breaker.reset_timeout_ms == 0 {
        errors.push(ValidationError::new("breaker.reset_timeout_ms", "must be greater than 0"));
    }
    if breaker.rolling_buckets == 0 {
        errors.push(ValidationError::new("breaker.rolling_buckets", "must be greater than 0"));
    } else if breaker.rolling_window_ms % breaker.rolling_buckets as u64 != 0 {
        errors.push(ValidationError::new(
            "breaker.rolling_window_ms",
            "must be evenly divisible by rolling_buckets",
        ));
    }

    if config.event_bus.max_listeners == 0 {
        errors.push(ValidationError::new("event_bus.max_listeners", "must be greater than 0"));
    }

    let connection = &config.connection;
    match Url::parse(&connection.url) {
        Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
        Ok(url) => errors.push(ValidationError::new(
            "connection.url",
            format!("unsupported scheme '{}', expected ws or wss", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("connection.url", e.to_string())),
    }
    if connection.reconnect_base_ms == 0 {
        errors.push(ValidationError::new("connection.reconnect_base_ms", "must be greater than 0"));
    }
    if connection.reconnect_max_ms < connection.reconnect_base_ms {
        errors.push(ValidationError::new(
            "connection.reconnect_max_ms",
            "must be at least reconnect_base_ms",
        ));
    }
    if !(0.0..=1.0).contains(&connection.jitter_ratio) {
        errors.push(ValidationError::new("connection.jitter_ratio", "must be within [0, 1]"));
    }
    if connection.heartbeat_interval_ms == 0 {
        errors.push(ValidationError::new("connection.heartbeat_interval_ms", "must be greater than 0"));
    }
    if connection.heartbeat_timeout_ms == 0 {
        errors.push(ValidationError::new("connection.heartbeat_timeout_ms", "must be greater than 0"));
    }
    if connection.max_missed_heartbeats == 0 {
        errors.push(ValidationError::new("connection.max_missed_heartbeats", "must be greater than 0"));
    }
    if connection.quality_window == 0 {
        errors.push(ValidationError::new("connection.quality_window", "must be greater than 0"));
    }

    if config.broadcaster.max_queue_per_stream == 0 {
        errors.push(ValidationError::new(
            "broadcaster.max_queue_per_stream",
            "must be greater than 0",
        ));
    }

    let observability = &config.observability;
    if !matches!(
        observability.log_level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", observability.log_level),
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
