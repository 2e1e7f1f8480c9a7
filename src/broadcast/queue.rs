//! Bounded per-stream offline queue.
//!
//! # Design Decisions
//! - FIFO; sequence numbers are per stream and strictly increasing
//! - At capacity the oldest entry is evicted and reported, never dropped silently
//! - Removal after delivery is keyed by sequence so an eviction racing a
//!   send cannot remove the wrong entry

use std::collections::VecDeque;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedUpdate {
    pub stream_key: String,
    pub payload: Value,
    pub enqueued_at: Instant,
    pub sequence: u64,
    /// Sent without throttle spacing.
    pub immediate: bool,
}

/// A stream's queue was full and its oldest update was evicted.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("offline queue for '{stream_key}' full; evicted update #{evicted_sequence}")]
pub struct QueueOverflow {
    pub stream_key: String,
    pub evicted_sequence: u64,
    /// Evictions for this stream so far.
    pub evicted_total: u64,
}

#[derive(Debug, Default)]
pub struct StreamQueue {
    entries: VecDeque<QueuedUpdate>,
    next_sequence: u64,
    evicted: u64,
}

impl StreamQueue {
    /// Append an update, evicting the oldest entry if `capacity` is reached.
    pub fn push(
        &mut self,
        stream_key: &str,
        payload: Value,
        immediate: bool,
        capacity: usize,
    ) -> Result<u64, QueueOverflow> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let mut overflow = None;
        while self.entries.len() >= capacity.max(1) {
            let Some(oldest) = self.entries.pop_front() else {
                break;
            };
            self.evicted += 1;
            overflow = Some(QueueOverflow {
                stream_key: stream_key.to_string(),
                evicted_sequence: oldest.sequence,
                evicted_total: self.evicted,
            });
        }

        self.entries.push_back(QueuedUpdate {
            stream_key: stream_key.to_string(),
            payload,
            enqueued_at: Instant::now(),
            sequence,
            immediate,
        });

        match overflow {
            Some(overflow) => Err(overflow),
            None => Ok(sequence),
        }
    }

    pub fn front(&self) -> Option<&QueuedUpdate> {
        self.entries.front()
    }

    /// Remove the head if it is still `sequence`.
    pub fn pop_confirmed(&mut self, sequence: u64) -> bool {
        if self.entries.front().is_some_and(|head| head.sequence == sequence) {
            self.entries.pop_front();
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
