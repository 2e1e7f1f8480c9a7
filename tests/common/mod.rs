//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use session_relay::config::RelayConfig;
use session_relay::connection::{ConnectionState, ConnectionSupervisor, Transport, TransportError, TransportEvent, TransportEvents};
use session_relay::events::{BoxError, Event, RelayEvent};
use session_relay::{OutboundMessage, Relay};

#[derive(Default)]
struct MockState {
    sent: Mutex<Vec<(Instant, OutboundMessage)>>,
    link: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    online: AtomicBool,
    connects: AtomicU32,
    failing_connects: AtomicU32,
    connect_delay_ms: AtomicU64,
}

/// In-memory transport with scriptable failures.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `n` connect attempts.
    pub fn fail_next_connects(&self, n: u32) {
        self.state.failing_connects.store(n, Ordering::SeqCst);
    }

    /// Make every successful handshake take `delay`.
    pub fn slow_connects(&self, delay: Duration) {
        self.state.connect_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Simulate the peer going away.
    pub fn drop_link(&self) {
        self.state.online.store(false, Ordering::SeqCst);
        if let Some(link) = self.state.link.lock().unwrap().take() {
            let _ = link.send(TransportEvent::Close {
                reason: Some("peer went away".into()),
            });
        }
    }

    /// Keep the link open but fail every ping and send.
    pub fn go_silent(&self) {
        self.state.online.store(false, Ordering::SeqCst);
    }

    /// Deliver an inbound message on the current link.
    pub fn push_message(&self, text: &str) {
        if let Some(link) = self.state.link.lock().unwrap().as_ref() {
            let _ = link.send(TransportEvent::Message(text.to_string()));
        }
    }

    pub fn connect_count(&self) -> u32 {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(Instant, OutboundMessage)> {
        self.state.sent.lock().unwrap().clone()
    }

    /// Payloads sent for `stream_key`, in order.
    pub fn payloads_for(&self, stream_key: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|(_, m)| m.stream_key == stream_key)
            .map(|(_, m)| m.payload)
            .collect()
    }
}

impl Transport for MockTransport {
    async fn connect(&self) -> Result<TransportEvents, TransportError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self.state.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(TransportError::Connect("connection refused".into()));
        }
        let delay = self.state.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(TransportEvent::Open);
        *self.state.link.lock().unwrap() = Some(tx);
        self.state.online.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        if !self.state.online.load(Ordering::SeqCst) {
            return Err(TransportError::Closed("offline".into()));
        }
        self.state.sent.lock().unwrap().push((Instant::now(), message.clone()));
        Ok(())
    }

    async fn ping(&self) -> Result<(), TransportError> {
        if self.state.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    async fn close(&self) {
        self.state.online.store(false, Ordering::SeqCst);
        self.state.link.lock().unwrap().take();
    }
}

/// Defaults tuned for paused-clock tests.
pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.connection.reconnect_base_ms = 100;
    config.connection.reconnect_max_ms = 1_000;
    config.connection.jitter_ratio = 0.0;
    config.connection.heartbeat_interval_ms = 60_000;
    config.broadcaster.throttle_ms = 1_000;
    config
}

pub fn relay(config: &RelayConfig) -> (Relay<MockTransport>, MockTransport) {
    let transport = MockTransport::new();
    let relay = Relay::build(config, transport.clone(), None);
    (relay, transport)
}

pub async fn wait_for_state(supervisor: &ConnectionSupervisor<MockTransport>, target: ConnectionState) {
    let mut rx = supervisor.watch_state();
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(|state| *state == target))
        .await
        .expect("timed out waiting for connection state")
        .expect("state channel closed");
}

/// Collect every event of `event_type` published on the relay's bus.
pub fn record_events(relay: &Relay<MockTransport>, event_type: &str) -> Arc<Mutex<Vec<RelayEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    relay.bus.on(event_type, move |event: Arc<Event<RelayEvent>>| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(event.data.clone());
            Ok::<(), BoxError>(())
        }
    });
    seen
}
