//! Throttled, offline-tolerant broadcaster.
//!
//! # Responsibilities
//! - Collapse bursts per stream to one update per throttle window
//! - Queue emitted updates while the connection is down
//! - Flush each stream in order once connected, spacing sends by the throttle
//! - Push terminal updates out without throttling, after any pending one
//!
//! # Data Flow
//! ```text
//! send(key, payload)
//!     → terminal?  yes → cancel window → queue [pending, terminal] (immediate)
//!                  no  → ThrottleWindow (trailing edge)
//!                           → window closes → StreamQueue
//!     → per-stream flusher (while Connected)
//!           → ConnectionSupervisor::send → confirmed → pop
//!           → error → stop; resumed on next connection:changed → Connected
//! ```
//!
//! # Design Decisions
//! - One mutex over all stream state; never held across an await
//! - At most one flusher per stream
//! - Stream state is dropped after completion, or once a stream has been
//!   quiet for a full throttle interval
//! - Transport errors never surface to `send` callers; they surface as
//!   connection state and queued counts

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde_json::Value;
use tokio::time::Instant;

use crate::broadcast::message::{is_terminal, OutboundMessage};
use crate::broadcast::queue::{QueueOverflow, StreamQueue};
use crate::broadcast::throttle::{spacing_delay, Offer, ThrottleWindow};
use crate::config::BroadcasterConfig;
use crate::connection::{ConnectionState, ConnectionSupervisor, Transport};
use crate::events::{BoxError, Event, EventBus, QueueFlushed, RelayEvent, Subscription, CONNECTION_CHANGED};
use crate::observability::metrics;

/// Invoked with `true` on entering Connected and `false` on leaving it.
pub type ConnectionCallback = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, Default)]
struct StreamState {
    window: ThrottleWindow,
    queue: StreamQueue,
    last_sent_at: Option<Instant>,
    flushing: bool,
    /// A terminal update has been queued.
    completed: bool,
}

impl StreamState {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && !self.window.is_open() && !self.flushing
    }
}

pub struct Broadcaster<T> {
    supervisor: Arc<ConnectionSupervisor<T>>,
    bus: Arc<EventBus<RelayEvent>>,
    settings: ArcSwap<BroadcasterConfig>,
    streams: Mutex<HashMap<String, StreamState>>,
    on_connection_change: Option<ConnectionCallback>,
    subscription: Mutex<Option<Subscription>>,
}

impl<T: Transport> Broadcaster<T> {
    pub fn new(
        config: BroadcasterConfig,
        supervisor: Arc<ConnectionSupervisor<T>>,
        on_connection_change: Option<ConnectionCallback>,
    ) -> Arc<Self> {
        let bus = Arc::clone(supervisor.bus());
        let broadcaster = Arc::new(Self {
            supervisor,
            bus,
            settings: ArcSwap::from_pointee(config),
            streams: Mutex::new(HashMap::new()),
            on_connection_change,
            subscription: Mutex::new(None),
        });

        let weak = Arc::downgrade(&broadcaster);
        let subscription = broadcaster.bus.on(CONNECTION_CHANGED, move |event: Arc<Event<RelayEvent>>| {
            let weak: Weak<Self> = weak.clone();
            async move {
                if let (Some(this), RelayEvent::ConnectionChanged(change)) = (weak.upgrade(), &event.data) {
                    this.on_state_change(change.previous, change.current);
                }
                Ok::<(), BoxError>(())
            }
        });
        *broadcaster.subscription.lock().unwrap_or_else(PoisonError::into_inner) = Some(subscription);

        broadcaster
    }

    /// Submit an update for `stream_key`.
    pub async fn send(self: &Arc<Self>, stream_key: &str, payload: Value) {
        let settings = self.settings.load_full();
        if !settings.enabled {
            tracing::trace!(stream_key, "Broadcaster disabled; update dropped");
            return;
        }

        if is_terminal(&payload) {
            self.send_terminal(stream_key, payload, &settings).await;
            return;
        }

        let superseded = {
            let mut streams = self.lock_streams();
            let stream = streams.entry(stream_key.to_string()).or_default();
            stream.completed = false;
            match stream.window.offer(payload) {
                Offer::Opened => {
                    let weak = Arc::downgrade(self);
                    let key = stream_key.to_string();
                    let throttle = Duration::from_millis(settings.throttle_ms);
                    stream.window.arm(tokio::spawn(async move {
                        tokio::time::sleep(throttle).await;
                        if let Some(this) = weak.upgrade() {
                            this.close_window(&key).await;
                        }
                    }));
                    false
                }
                Offer::Superseded => true,
                Offer::Pending => false,
            }
        };
        if superseded {
            metrics::record_update_superseded();
            tracing::trace!(stream_key, "Pending update superseded");
        }
    }

    async fn send_terminal(self: &Arc<Self>, stream_key: &str, payload: Value, settings: &BroadcasterConfig) {
        let mut overflows = Vec::new();
        let kick = {
            let mut streams = self.lock_streams();
            let stream = streams.entry(stream_key.to_string()).or_default();
            if let Some(pending) = stream.window.cancel() {
                if let Err(o) = stream.queue.push(stream_key, pending, true, settings.max_queue_per_stream) {
                    overflows.push(o);
                }
            }
            if let Err(o) = stream.queue.push(stream_key, payload, true, settings.max_queue_per_stream) {
                overflows.push(o);
            }
            stream.completed = true;
            metrics::record_queue_depth(stream.queue.len());
            self.claim_flush(stream)
        };
        tracing::debug!(stream_key, "Terminal update queued");

        for overflow in overflows {
            self.report_overflow(overflow).await;
        }
        if kick {
            self.spawn_flusher(stream_key.to_string());
        }
    }

    async fn close_window(self: &Arc<Self>, stream_key: &str) {
        let cap = self.settings.load().max_queue_per_stream;
        let (overflow, kick) = {
            let mut streams = self.lock_streams();
            let Some(stream) = streams.get_mut(stream_key) else {
                return;
            };
            let Some(payload) = stream.window.close() else {
                return;
            };
            let overflow = stream.queue.push(stream_key, payload, false, cap).err();
            metrics::record_queue_depth(stream.queue.len());
            (overflow, self.claim_flush(stream))
        };

        if let Some(overflow) = overflow {
            self.report_overflow(overflow).await;
        }
        if kick {
            self.spawn_flusher(stream_key.to_string());
        } else if !self.supervisor.is_connected() {
            tracing::debug!(stream_key, "Offline; update queued");
        }
    }

    /// Marks the stream as flushing if a flusher should start now.
    fn claim_flush(&self, stream: &mut StreamState) -> bool {
        if stream.flushing || stream.queue.is_empty() || !self.supervisor.is_connected() {
            return false;
        }
        stream.flushing = true;
        true
    }

    fn spawn_flusher(self: &Arc<Self>, stream_key: String) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.flush_stream(stream_key).await });
    }

    async fn flush_stream(self: Arc<Self>, stream_key: String) {
        let mut delivered = 0usize;

        loop {
            let next = {
                let mut streams = self.lock_streams();
                let Some(stream) = streams.get_mut(&stream_key) else {
                    return;
                };
                match stream.queue.front().cloned() {
                    Some(update) => Some((update, stream.last_sent_at)),
                    None => {
                        stream.flushing = false;
                        None
                    }
                }
            };
            let Some((update, last_sent_at)) = next else {
                break;
            };

            if !update.immediate {
                let throttle = Duration::from_millis(self.settings.load().throttle_ms);
                let wait = spacing_delay(last_sent_at, throttle, Instant::now());
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
            }

            let message = OutboundMessage::new(stream_key.clone(), update.payload.clone());
            let result = self.supervisor.send(&message).await;

            let keep_going = {
                let mut streams = self.lock_streams();
                let Some(stream) = streams.get_mut(&stream_key) else {
                    return;
                };
                match result {
                    Ok(()) => {
                        stream.queue.pop_confirmed(update.sequence);
                        stream.last_sent_at = Some(Instant::now());
                        metrics::record_update_sent();
                        metrics::record_queue_depth(stream.queue.len());
                        delivered += 1;
                        true
                    }
                    Err(e) => {
                        stream.flushing = false;
                        tracing::debug!(stream_key = %stream_key, error = %e, "Send failed; update stays queued");
                        false
                    }
                }
            };
            if !keep_going {
                break;
            }
        }

        let (remaining, linger) = {
            let mut streams = self.lock_streams();
            let remaining = streams.get(&stream_key).map_or(0, |s| s.queue.len());
            let (completed, idle) = streams
                .get(&stream_key)
                .map_or((false, false), |s| (s.completed, s.is_idle()));
            if completed && idle {
                streams.remove(&stream_key);
                tracing::debug!(stream_key = %stream_key, "Stream completed; state released");
            }
            (remaining, idle && !completed)
        };
        if linger {
            self.release_when_idle(stream_key.clone());
        }

        if delivered > 0 {
            tracing::debug!(stream_key = %stream_key, delivered, remaining, "Queue flushed");
            let flushed = RelayEvent::QueueFlushed(QueueFlushed {
                stream_key,
                delivered,
                remaining,
            });
            let _ = self.bus.emit(flushed.into_event()).await;
        }
    }

    /// Forget a stream that went quiet without completing, once its last
    /// send is a full throttle interval old.
    fn release_when_idle(self: &Arc<Self>, stream_key: String) {
        let throttle = Duration::from_millis(self.settings.load().throttle_ms);
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(throttle).await;
            let Some(this) = weak.upgrade() else {
                return;
            };
            let mut streams = this.lock_streams();
            let stale = streams.get(&stream_key).is_some_and(|s| {
                s.is_idle() && !s.completed && s.last_sent_at.map_or(true, |at| at.elapsed() >= throttle)
            });
            if stale {
                streams.remove(&stream_key);
                tracing::debug!(stream_key = %stream_key, "Idle stream released");
            }
        });
    }

    async fn report_overflow(&self, overflow: QueueOverflow) {
        metrics::record_queue_eviction();
        tracing::warn!(
            stream_key = %overflow.stream_key,
            evicted_sequence = overflow.evicted_sequence,
            evicted_total = overflow.evicted_total,
            "Offline queue full; oldest update evicted"
        );
        let _ = self.bus.emit(RelayEvent::QueueOverflow(overflow).into_event()).await;
    }

    fn on_state_change(self: &Arc<Self>, previous: ConnectionState, current: ConnectionState) {
        let connected = current.is_connected();
        if previous.is_connected() != connected {
            if let Some(callback) = &self.on_connection_change {
                callback(connected);
            }
        }
        if !connected {
            return;
        }

        let keys: Vec<String> = {
            let mut streams = self.lock_streams();
            streams
                .iter_mut()
                .filter_map(|(key, stream)| self.claim_flush(stream).then(|| key.clone()))
                .collect()
        };
        if !keys.is_empty() {
            tracing::info!(streams = keys.len(), "Connected; flushing offline queues");
        }
        for key in keys {
            self.spawn_flusher(key);
        }
    }

    /// Start the underlying connection.
    pub fn connect(&self) {
        self.supervisor.connect();
    }

    /// Stop the connection; queued updates are kept.
    pub async fn disconnect(&self) {
        self.supervisor.disconnect().await;
    }

    /// Updates waiting across all streams.
    pub fn queued_count(&self) -> usize {
        self.lock_streams().values().map(|s| s.queue.len()).sum()
    }

    /// Updates evicted across all live streams.
    pub fn evicted_count(&self) -> u64 {
        self.lock_streams().values().map(|s| s.queue.evicted()).sum()
    }

    /// Streams with live state: an open window, queued updates or a recent send.
    pub fn active_streams(&self) -> usize {
        self.lock_streams().len()
    }

    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    pub fn settings(&self) -> Arc<BroadcasterConfig> {
        self.settings.load_full()
    }

    /// Swap throttle, queue cap and enable flag. Open windows keep their timers.
    pub fn apply_settings(&self, settings: BroadcasterConfig) {
        tracing::info!(
            enabled = settings.enabled,
            throttle_ms = settings.throttle_ms,
            max_queue_per_stream = settings.max_queue_per_stream,
            "Broadcaster settings applied"
        );
        self.settings.store(Arc::new(settings));
    }

    /// Wait until every queue is empty or `limit` elapses. Returns true if drained.
    pub async fn drain(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            let idle = self.lock_streams().values().all(|s| s.queue.is_empty() && !s.window.is_open());
            if idle {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor<T>> {
        &self.supervisor
    }

    fn lock_streams(&self) -> MutexGuard<'_, HashMap<String, StreamState>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Drop for Broadcaster<T> {
    fn drop(&mut self) {
        let subscription = self.subscription.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        let streams = self.streams.get_mut().unwrap_or_else(PoisonError::into_inner);
        for stream in streams.values_mut() {
            stream.window.cancel();
        }
    }
}
