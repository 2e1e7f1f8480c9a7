//! Contract the supervisor requires from a real-time transport.
//!
//! # Design Decisions
//! - `connect` resolves once the link is open and hands back a receiver of
//!   lifecycle events; the receiver closing is treated as a drop
//! - `ping` resolves when the peer answers; the caller applies the deadline
//! - Wire framing is the transport's concern

use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::broadcast::OutboundMessage;

/// Lifecycle and inbound traffic reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Error(String),
    Close { reason: Option<String> },
}

/// Receiver half handed out by [`Transport::connect`].
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed: {0}")]
    Closed(String),

    #[error("{missed} consecutive heartbeats missed")]
    HeartbeatTimeout { missed: u32 },
}

pub trait Transport: Send + Sync + 'static {
    /// Open the link.
    fn connect(&self) -> impl Future<Output = Result<TransportEvents, TransportError>> + Send;

    fn send(&self, message: &OutboundMessage) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Round-trip a liveness probe.
    fn ping(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Close the link. Idempotent.
    fn close(&self) -> impl Future<Output = ()> + Send;
}
