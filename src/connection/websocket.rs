//! WebSocket transport.
//!
//! # Data Flow
//! ```text
//! connect()  → TCP/TLS + upgrade → split
//!              sink   ← send() / ping() / close()
//!              source → reader task → TransportEvent channel
//!                                   → Pong completes a waiting ping()
//! ```
//!
//! # Design Decisions
//! - Outbound messages are JSON text frames
//! - Peer pings are answered by tungstenite itself
//! - Only one ping is outstanding at a time; a new ping replaces the waiter

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::broadcast::OutboundMessage;
use crate::connection::transport::{Transport, TransportError, TransportEvent, TransportEvents};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type PongWaiter = Arc<Mutex<Option<oneshot::Sender<()>>>>;

pub struct WsTransport {
    url: String,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    pong: PongWaiter,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sink: tokio::sync::Mutex::new(None),
            reader: Mutex::new(None),
            pong: Arc::new(Mutex::new(None)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn stop_reader(&self) {
        let reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(reader) = reader {
            reader.abort();
        }
    }
}

impl Transport for WsTransport {
    async fn connect(&self) -> Result<TransportEvents, TransportError> {
        self.close().await;

        let (stream, response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!(url = %self.url, status = %response.status(), "WebSocket handshake complete");

        let (sink, mut source) = stream.split();
        *self.sink.lock().await = Some(sink);

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(TransportEvent::Open);

        let pong = Arc::clone(&self.pong);
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if tx.send(TransportEvent::Message(text.as_str().to_owned())).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Pong(_)) => {
                        let waiter = pong.lock().unwrap_or_else(PoisonError::into_inner).take();
                        if let Some(waiter) = waiter {
                            let _ = waiter.send(());
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let reason = frame.map(|f| f.reason.as_str().to_owned());
                        let _ = tx.send(TransportEvent::Close { reason });
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = tx.send(TransportEvent::Error(e.to_string()));
                        let _ = tx.send(TransportEvent::Close {
                            reason: Some(e.to_string()),
                        });
                        return;
                    }
                }
            }
            let _ = tx.send(TransportEvent::Close { reason: None });
        });
        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(reader);

        Ok(rx)
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let text = serde_json::to_string(message)?;
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;
        sink.send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn ping(&self) -> Result<(), TransportError> {
        let (tx, rx) = oneshot::channel();
        *self.pong.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        {
            let mut guard = self.sink.lock().await;
            let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;
            sink.send(Message::Ping(Default::default()))
                .await
                .map_err(|e| TransportError::Send(e.to_string()))?;
        }
        rx.await
            .map_err(|_| TransportError::Closed("link closed while awaiting pong".to_string()))
    }

    async fn close(&self) {
        self.stop_reader();
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        }
        self.pong.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}
