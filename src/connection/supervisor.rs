//! Connection supervisor: owns the logical connection.
//!
//! # Responsibilities
//! - Drive the connection state machine and publish every transition
//! - Reconnect with exponential backoff after drops and failed handshakes
//! - Heartbeat the link and rate its quality
//! - Relay inbound transport messages onto the bus
//!
//! # Data Flow
//! ```text
//! connect() → run loop task
//!     Connecting → handshake (circuit breaker) ─ok→ Connected → serve()
//!          ▲                                  └─err─┐          │ drop / missed heartbeats
//!          └──── backoff sleep ◄── Reconnecting ◄───┴──────────┘
//!                                       │ budget exhausted
//!                                       ▼
//!                                  Disconnected
//! ```
//!
//! # Design Decisions
//! - State lives in a watch channel: one writer, any number of readers
//! - The run loop is a single task; `disconnect()` aborts it
//! - Attempt counter counts consecutive failures and resets on success

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::broadcast::OutboundMessage;
use crate::config::{CircuitBreakerConfig, ConnectionConfig};
use crate::connection::quality::{ConnectionQuality, QualityMonitor};
use crate::connection::state::ConnectionState;
use crate::connection::transport::{Transport, TransportError, TransportEvent, TransportEvents};
use crate::events::{ConnectionChange, EventBus, RelayEvent};
use crate::observability::metrics;
use crate::resilience::timeouts::{with_deadline, Deadline};
use crate::resilience::{Backoff, CircuitBreaker};

type Handshake = CircuitBreaker<(), TransportEvents, TransportError>;

pub struct ConnectionSupervisor<T> {
    transport: Arc<T>,
    config: ConnectionConfig,
    backoff: Backoff,
    handshake: Handshake,
    state: watch::Sender<ConnectionState>,
    attempts: AtomicU32,
    quality: Mutex<QualityMonitor>,
    task: Mutex<Option<JoinHandle<()>>>,
    bus: Arc<EventBus<RelayEvent>>,
}

impl<T: Transport> ConnectionSupervisor<T> {
    pub fn new(
        transport: Arc<T>,
        config: ConnectionConfig,
        breaker: CircuitBreakerConfig,
        bus: Arc<EventBus<RelayEvent>>,
    ) -> Arc<Self> {
        let connector = Arc::clone(&transport);
        let handshake = CircuitBreaker::new(breaker, move |()| -> BoxFuture<'static, _> {
            let transport = Arc::clone(&connector);
            Box::pin(async move { transport.connect().await })
        });
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Arc::new(Self {
            transport,
            backoff: Backoff::from_config(&config),
            quality: Mutex::new(QualityMonitor::new(config.quality_window)),
            config,
            handshake,
            state,
            attempts: AtomicU32::new(0),
            task: Mutex::new(None),
            bus,
        })
    }

    /// Start the connection loop. No-op if it is already running.
    pub fn connect(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!("Connection loop already running");
            return;
        }
        self.attempts.store(0, Ordering::SeqCst);
        *task = Some(tokio::spawn(Arc::clone(self).run()));
    }

    /// Stop reconnecting, close the transport and report Disconnected.
    pub async fn disconnect(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
        }
        self.transport.close().await;
        self.attempts.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected).await;
    }

    /// Transmit through the transport. Fails fast unless Connected.
    pub async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.transport.send(message).await
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Consecutive failed attempts since the last successful handshake.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn quality(&self) -> ConnectionQuality {
        if !self.is_connected() {
            return ConnectionQuality::Poor;
        }
        self.lock_quality().rating()
    }

    pub fn handshake_breaker(&self) -> &Handshake {
        &self.handshake
    }

    pub fn bus(&self) -> &Arc<EventBus<RelayEvent>> {
        &self.bus
    }

    fn lock_quality(&self) -> MutexGuard<'_, QualityMonitor> {
        self.quality.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(self: Arc<Self>) {
        loop {
            self.set_state(ConnectionState::Connecting).await;

            match self.handshake.fire(()).await {
                Ok(events) => {
                    self.attempts.store(0, Ordering::SeqCst);
                    self.lock_quality().reset();
                    self.set_state(ConnectionState::Connected).await;
                    tracing::info!("Connection established");

                    let reason = self.serve(events).await;
                    tracing::warn!(reason = %reason, "Connection lost");
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt = self.attempts() + 1, "Handshake failed");
                }
            }

            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(max) = self.config.max_reconnect_attempts {
                if attempt > max {
                    tracing::error!(attempts = attempt - 1, "Reconnect attempts exhausted; giving up");
                    self.set_state(ConnectionState::Disconnected).await;
                    return;
                }
            }

            metrics::record_reconnect_attempt();
            self.set_state(ConnectionState::Reconnecting).await;
            let delay = self.backoff.delay(attempt);
            tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting after backoff");
            tokio::time::sleep(delay).await;
        }
    }

    /// Pump transport events and heartbeats until the link drops.
    async fn serve(&self, mut events: TransportEvents) -> TransportError {
        let interval = Duration::from_millis(self.config.heartbeat_interval_ms);
        let mut heartbeat = tokio::time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(TransportEvent::Open) => tracing::debug!("Transport reported open"),
                    Some(TransportEvent::Message(text)) => {
                        let _ = self.bus.emit(RelayEvent::Message { text }.into_event()).await;
                    }
                    Some(TransportEvent::Error(error)) => {
                        tracing::warn!(error = %error, "Transport error");
                    }
                    Some(TransportEvent::Close { reason }) => {
                        return TransportError::Closed(reason.unwrap_or_else(|| "closed by peer".to_string()));
                    }
                    None => return TransportError::Closed("event stream ended".to_string()),
                },
                _ = heartbeat.tick() => {
                    if let Err(e) = self.heartbeat().await {
                        return e;
                    }
                }
            }
        }
    }

    async fn heartbeat(&self) -> Result<(), TransportError> {
        let started = Instant::now();
        let limit = Duration::from_millis(self.config.heartbeat_timeout_ms);
        let outcome = with_deadline(limit, self.transport.ping()).await;

        let missed = match outcome {
            Deadline::Completed(Ok(())) => {
                let rtt = started.elapsed();
                self.lock_quality().record_success(rtt);
                metrics::record_heartbeat(Some(rtt));
                tracing::trace!(rtt_ms = rtt.as_millis() as u64, "Heartbeat ok");
                return Ok(());
            }
            Deadline::Completed(Err(e)) => {
                tracing::debug!(error = %e, "Heartbeat failed");
                self.lock_quality().record_failure()
            }
            Deadline::Elapsed => {
                tracing::debug!(timeout_ms = self.config.heartbeat_timeout_ms, "Heartbeat timed out");
                self.lock_quality().record_failure()
            }
        };
        metrics::record_heartbeat(None);

        if missed >= self.config.max_missed_heartbeats {
            Err(TransportError::HeartbeatTimeout { missed })
        } else {
            Ok(())
        }
    }

    async fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous == next {
            return;
        }
        metrics::record_connection_state(next);
        tracing::debug!(from = %previous, to = %next, attempts = self.attempts(), "Connection state changed");

        let change = ConnectionChange {
            previous,
            current: next,
            attempt: self.attempts(),
        };
        let _ = self.bus.emit(RelayEvent::ConnectionChanged(change).into_event()).await;
    }
}

impl<T> std::fmt::Debug for ConnectionSupervisor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("state", &*self.state.borrow())
            .field("attempts", &self.attempts.load(Ordering::SeqCst))
            .finish()
    }
}
