//! Connection subsystem.
//!
//! # Data Flow
//! ```text
//! Broadcaster ──send──► supervisor.rs (state machine, reconnect, heartbeat)
//!                           │            │
//!                           │            └─► quality.rs (heartbeat-derived rating)
//!                           ▼
//!                     transport.rs (contract) ◄── websocket.rs (default adapter)
//! ```
//!
//! # Design Decisions
//! - The supervisor is generic over the transport so tests drive it with mocks
//! - State changes are published on the event bus, never by direct callback

pub mod quality;
pub mod state;
pub mod supervisor;
pub mod transport;
pub mod websocket;

pub use quality::{ConnectionQuality, QualityMonitor};
pub use state::ConnectionState;
pub use supervisor::ConnectionSupervisor;
pub use transport::{Transport, TransportError, TransportEvent, TransportEvents};
pub use websocket::WsTransport;
