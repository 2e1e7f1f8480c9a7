//! Event envelope and the relay's own event vocabulary.

use std::time::SystemTime;

use serde::Serialize;
use uuid::Uuid;

pub use crate::broadcast::queue::QueueOverflow;
use crate::connection::ConnectionState;

/// Emitted on every connection state transition.
pub const CONNECTION_CHANGED: &str = "connection:changed";
/// Emitted after a stream's queued updates were delivered.
pub const QUEUE_FLUSHED: &str = "queue:flushed";
/// Emitted when an offline queue evicts its oldest entry.
pub const QUEUE_OVERFLOW: &str = "queue:overflow";
/// Inbound message received from the transport.
pub const TRANSPORT_MESSAGE: &str = "transport:message";

/// Identity and timing attached to every emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventMetadata {
    /// Unique per emission.
    pub event_id: Uuid,
    /// Groups related emissions; defaults to a fresh id.
    pub correlation_id: Uuid,
    pub timestamp: SystemTime,
}

/// An immutable, typed event.
#[derive(Debug, Clone, Serialize)]
pub struct Event<T> {
    pub event_type: String,
    pub data: T,
    pub metadata: EventMetadata,
}

impl<T> Event<T> {
    pub fn new(event_type: impl Into<String>, data: T) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                correlation_id: Uuid::new_v4(),
                timestamp: SystemTime::now(),
            },
        }
    }

    /// Tie this event to an existing correlation id.
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.metadata.correlation_id = correlation_id;
        self
    }
}

/// Payload of [`CONNECTION_CHANGED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionChange {
    pub previous: ConnectionState,
    pub current: ConnectionState,
    /// Reconnect attempt count at the time of the transition.
    pub attempt: u32,
}

/// Payload of [`QUEUE_FLUSHED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueFlushed {
    pub stream_key: String,
    pub delivered: usize,
    pub remaining: usize,
}

/// Events carried on the relay's internal bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelayEvent {
    ConnectionChanged(ConnectionChange),
    QueueFlushed(QueueFlushed),
    QueueOverflow(QueueOverflow),
    Message { text: String },
}

impl RelayEvent {
    /// Bus event type this payload is published under.
    pub fn event_type(&self) -> &'static str {
        match self {
            RelayEvent::ConnectionChanged(_) => CONNECTION_CHANGED,
            RelayEvent::QueueFlushed(_) => QUEUE_FLUSHED,
            RelayEvent::QueueOverflow(_) => QUEUE_OVERFLOW,
            RelayEvent::Message { .. } => TRANSPORT_MESSAGE,
        }
    }

    /// Wrap into an [`Event`] under its own type.
    pub fn into_event(self) -> Event<RelayEvent> {
        Event::new(self.event_type(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_are_unique() {
        let a = Event::new("x", 1);
        let b = Event::new("x", 1);
        assert_ne!(a.metadata.event_id, b.metadata.event_id);
    }

    #[test]
    fn test_correlation_id_override() {
        let correlation = Uuid::new_v4();
        let event = Event::new("x", ()).with_correlation_id(correlation);
        assert_eq!(event.metadata.correlation_id, correlation);
    }

    #[test]
    fn test_relay_event_type_mapping() {
        let event = RelayEvent::QueueFlushed(QueueFlushed {
            stream_key: "A".into(),
            delivered: 2,
            remaining: 0,
        })
        .into_event();
        assert_eq!(event.event_type, QUEUE_FLUSHED);

        let json = serde_json::to_value(&event.data).unwrap();
        assert_eq!(json["kind"], "queue_flushed");
        assert_eq!(json["stream_key"], "A");
    }
}
