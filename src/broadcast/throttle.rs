//! Per-stream trailing-edge throttle.
//!
//! ```text
//! t=0    offer(u1) → window opens, pending=u1
//! t=50   offer(u2) → pending=u2 (u1 superseded)
//! t=T    close()   → emits u2
//! ```

use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct ThrottleWindow {
    pending: Option<Value>,
    timer: Option<JoinHandle<()>>,
}

/// Result of offering an update to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// No window was open; caller must arm the timer.
    Opened,
    /// Stored in the open window.
    Pending,
    /// Replaced an earlier pending update.
    Superseded,
}

impl ThrottleWindow {
    pub fn offer(&mut self, payload: Value) -> Offer {
        let open = self.timer.is_some();
        let replaced = self.pending.replace(payload).is_some();
        match (open, replaced) {
            (false, _) => Offer::Opened,
            (true, true) => Offer::Superseded,
            (true, false) => Offer::Pending,
        }
    }

    pub fn arm(&mut self, timer: JoinHandle<()>) {
        if let Some(old) = self.timer.replace(timer) {
            old.abort();
        }
    }

    /// Window elapsed; hand back the update to emit.
    pub fn close(&mut self) -> Option<Value> {
        self.timer = None;
        self.pending.take()
    }

    /// Abort the timer and hand back the pending update.
    pub fn cancel(&mut self) -> Option<Value> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.pending.take()
    }

    pub fn is_open(&self) -> bool {
        self.timer.is_some()
    }
}

/// How long to wait before the next non-immediate send.
pub fn spacing_delay(last_sent_at: Option<Instant>, throttle: Duration, now: Instant) -> Duration {
    match last_sent_at {
        Some(last) => (last + throttle).saturating_duration_since(now),
        None => Duration::ZERO,
    }
}
