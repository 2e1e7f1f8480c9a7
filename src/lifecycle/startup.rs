//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the bus, supervisor and broadcaster from one configuration
//! - Start the connection
//! - Drain and disconnect on shutdown
//!
//! # Design Decisions
//! - Subsystems are built in dependency order, not concurrently
//! - The transport is injected so tests can substitute a mock

use std::sync::Arc;
use std::time::Duration;

use crate::broadcast::{Broadcaster, ConnectionCallback};
use crate::config::RelayConfig;
use crate::connection::{ConnectionSupervisor, Transport, WsTransport};
use crate::events::{EventBus, RelayEvent};

/// The wired event-delivery core.
pub struct Relay<T> {
    pub bus: Arc<EventBus<RelayEvent>>,
    pub supervisor: Arc<ConnectionSupervisor<T>>,
    pub broadcaster: Arc<Broadcaster<T>>,
}

impl<T: Transport> Relay<T> {
    pub fn build(config: &RelayConfig, transport: T, on_connection_change: Option<ConnectionCallback>) -> Self {
        let bus = Arc::new(EventBus::new(config.event_bus.clone()));
        let supervisor = ConnectionSupervisor::new(
            Arc::new(transport),
            config.connection.clone(),
            config.breaker.clone(),
            Arc::clone(&bus),
        );
        let broadcaster = Broadcaster::new(
            config.broadcaster.clone(),
            Arc::clone(&supervisor),
            on_connection_change,
        );

        tracing::debug!(
            breaker = %config.breaker.name,
            throttle_ms = config.broadcaster.throttle_ms,
            max_queue_per_stream = config.broadcaster.max_queue_per_stream,
            "Relay assembled"
        );

        Self {
            bus,
            supervisor,
            broadcaster,
        }
    }

    pub fn start(&self) {
        self.broadcaster.connect();
    }

    /// Wait up to `drain_timeout` for queues to empty, then disconnect.
    ///
    /// Returns false if updates were still queued at the deadline.
    pub async fn shutdown(&self, drain_timeout: Duration) -> bool {
        let drained = self.broadcaster.drain(drain_timeout).await;
        if !drained {
            tracing::warn!(
                queued = self.broadcaster.queued_count(),
                "Drain deadline reached; abandoning queued updates"
            );
        }
        self.broadcaster.disconnect().await;
        drained
    }
}

impl Relay<WsTransport> {
    /// Relay over the default WebSocket transport at `config.connection.url`.
    pub fn websocket(config: &RelayConfig, on_connection_change: Option<ConnectionCallback>) -> Self {
        let transport = WsTransport::new(config.connection.url.clone());
        Self::build(config, transport, on_connection_change)
    }
}
