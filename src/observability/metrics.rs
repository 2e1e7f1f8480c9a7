//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_breaker_state` (gauge): 0=closed, 1=half-open, 2=open, per breaker
//! - `relay_breaker_calls_total` (counter): by breaker, outcome
//! - `relay_breaker_rejections_total` (counter): by breaker
//! - `relay_connection_state` (gauge): 0=disconnected .. 3=reconnecting
//! - `relay_reconnect_attempts_total` (counter)
//! - `relay_heartbeat_rtt_seconds` (histogram), `relay_heartbeat_failures_total` (counter)
//! - `relay_handler_errors_total` (counter): by event type
//! - `relay_updates_sent_total`, `relay_updates_superseded_total` (counters)
//! - `relay_queue_depth` (gauge), `relay_queue_evictions_total` (counter)
//! - `relay_cache_lookups_total` (counter): by result; `relay_cache_entries` (gauge)
//!
//! # Design Decisions
//! - Updates go through the `metrics` facade; without an installed recorder
//!   they are no-ops, so library users and tests pay nothing
//! - Stream keys are never used as labels (unbounded cardinality)

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::connection::ConnectionState;
use crate::resilience::CircuitState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_breaker_state(name: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    metrics::gauge!("relay_breaker_state", "breaker" => name.to_string()).set(value);
}

pub fn record_breaker_call(name: &str, outcome: &'static str) {
    metrics::counter!("relay_breaker_calls_total", "breaker" => name.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_breaker_rejection(name: &str) {
    metrics::counter!("relay_breaker_rejections_total", "breaker" => name.to_string()).increment(1);
}

pub fn record_connection_state(state: ConnectionState) {
    let value = match state {
        ConnectionState::Disconnected => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Connected => 2.0,
        ConnectionState::Reconnecting => 3.0,
    };
    metrics::gauge!("relay_connection_state").set(value);
}

pub fn record_reconnect_attempt() {
    metrics::counter!("relay_reconnect_attempts_total").increment(1);
}

/// `None` records a missed heartbeat.
pub fn record_heartbeat(rtt: Option<Duration>) {
    match rtt {
        Some(rtt) => metrics::histogram!("relay_heartbeat_rtt_seconds").record(rtt.as_secs_f64()),
        None => metrics::counter!("relay_heartbeat_failures_total").increment(1),
    }
}

pub fn record_handler_error(event_type: &str) {
    metrics::counter!("relay_handler_errors_total", "event_type" => event_type.to_string()).increment(1);
}

pub fn record_update_sent() {
    metrics::counter!("relay_updates_sent_total").increment(1);
}

pub fn record_update_superseded() {
    metrics::counter!("relay_updates_superseded_total").increment(1);
}

pub fn record_queue_depth(depth: usize) {
    metrics::gauge!("relay_queue_depth").set(depth as f64);
}

pub fn record_queue_eviction() {
    metrics::counter!("relay_queue_evictions_total").increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("relay_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_size(entries: usize) {
    metrics::gauge!("relay_cache_entries").set(entries as f64);
}
