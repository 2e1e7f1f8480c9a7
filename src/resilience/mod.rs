//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an external dependency (handshake, REST fallback, ...):
//!     → circuit_breaker.rs (admit / reject, track rolling failure rate)
//!     → timeouts.rs (every admitted call races a deadline)
//!
//! Connection drop:
//!     → backoff.rs (exponential delay with jitter before reconnecting)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Circuit breaker prevents hammering a failing dependency
//! - Jittered backoff prevents reconnect storms

pub mod backoff;
pub mod circuit_breaker;
pub mod timeouts;

pub use backoff::{calculate_backoff, Backoff};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitError, CircuitState};
