//! Broadcast subsystem.
//!
//! # Data Flow
//! ```text
//! send(stream_key, payload)
//!     → throttle.rs (trailing-edge window per stream)
//!     → queue.rs (bounded FIFO per stream, evict oldest)
//!     → broadcaster.rs flusher → ConnectionSupervisor
//! ```

pub mod broadcaster;
pub mod message;
pub mod queue;
pub mod throttle;

pub use broadcaster::{Broadcaster, ConnectionCallback};
pub use message::{is_terminal, OutboundMessage, SessionProgress};
pub use queue::{QueueOverflow, QueuedUpdate, StreamQueue};
pub use throttle::ThrottleWindow;
