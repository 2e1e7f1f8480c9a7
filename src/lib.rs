//! Resilient event-delivery core.
//!
//! A circuit breaker for external calls, an in-process event bus, and a
//! reconnecting, throttled, offline-queueing broadcaster that pushes live
//! session progress over a persistent connection.

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod connection;
pub mod events;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use broadcast::{Broadcaster, OutboundMessage, SessionProgress};
pub use cache::TtlCache;
pub use config::RelayConfig;
pub use connection::{ConnectionState, ConnectionSupervisor, Transport, WsTransport};
pub use events::{Event, EventBus, RelayEvent};
pub use lifecycle::{Relay, Shutdown};
pub use resilience::{CircuitBreaker, CircuitError, CircuitState};
