//! Event subsystem.
//!
//! # Data Flow
//! ```text
//! ConnectionSupervisor ──► connection:changed, transport:message
//! Broadcaster          ──► queue:flushed, queue:overflow
//!                            │
//!                            ▼
//!                     EventBus<RelayEvent> ──► subscribers
//! ```

pub mod bus;
pub mod event;

pub use bus::{BoxError, EventBus, HandlerError, Subscription, SubscriptionId};
pub use event::{
    ConnectionChange, Event, EventMetadata, QueueFlushed, QueueOverflow, RelayEvent, CONNECTION_CHANGED,
    QUEUE_FLUSHED, QUEUE_OVERFLOW, TRANSPORT_MESSAGE,
};
