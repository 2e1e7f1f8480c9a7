//! Outbound message shape and the session progress payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the broadcaster hands to the transport for each update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub stream_key: String,
    pub payload: Value,
}

impl OutboundMessage {
    pub fn new(stream_key: impl Into<String>, payload: Value) -> Self {
        Self {
            stream_key: stream_key.into(),
            payload,
        }
    }
}

/// A payload is terminal when it carries `isCompleted: true`.
pub fn is_terminal(payload: &Value) -> bool {
    payload.get("isCompleted").and_then(Value::as_bool) == Some(true)
}

/// Live progress of a training session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub workout_id: String,
    pub event_id: String,
    /// Percent, 0 to 100.
    pub overall_progress: f64,
    pub current_interval: Option<String>,
    pub interval_index: u32,
    pub total_intervals: u32,
    pub heart_rate: Option<u32>,
    /// Seconds.
    pub total_time_elapsed: u64,
    pub is_completed: bool,
    pub is_paused: bool,
}

impl SessionProgress {
    pub fn to_payload(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
