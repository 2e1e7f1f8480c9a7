//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → EventBus → ConnectionSupervisor → Broadcaster → connect
//!
//! Shutdown (shutdown.rs):
//!     Signal or EOF → stop intake → drain queues (bounded) → disconnect
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One bus, one supervisor and one broadcaster per process, built here
//!   and passed by `Arc`; nothing is global
//! - Shutdown has a timeout: queued updates are abandoned after the deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use startup::Relay;
