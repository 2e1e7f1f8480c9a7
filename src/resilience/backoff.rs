//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

use crate::config::ConnectionConfig;

/// Calculate exponential backoff delay with jitter.
///
/// Attempt `0` means "no retry yet" and yields a zero delay. The jittered
/// delay never exceeds `max_ms`.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64, jitter_ratio: f64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = (capped_delay as f64 * jitter_ratio.clamp(0.0, 1.0)) as u64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay.saturating_add(jitter).min(max_ms))
}

/// Reconnect schedule for the connection supervisor.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base_ms: u64,
    pub max_ms: u64,
    pub jitter_ratio: f64,
}

impl Backoff {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            base_ms: config.reconnect_base_ms,
            max_ms: config.reconnect_max_ms,
            jitter_ratio: config.jitter_ratio,
        }
    }

    /// Delay to wait before reconnect attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_ms, self.max_ms, self.jitter_ratio)
    }
}
