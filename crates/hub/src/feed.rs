// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live feed hub: fans newly accepted events out to `/feed` subscribers.
//!
//! Delivery is best-effort, at-most-once per subscriber, ordered per
//! subscriber. A subscriber that falls more than the channel capacity
//! behind is disconnected. Attaching mid-stream yields only future events.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Per-subscriber send buffer limit.
const FEED_CAPACITY: usize = 64;

/// One frame on the live feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackFrame {
    pub source_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_username: Option<String>,
    pub event_timestamp: NaiveDateTime,
    /// Post-insert lifetime counter for the source IP.
    pub attempt_number: i64,
}

/// Broadcast hub for the live feed.
pub struct FeedHub {
    event_tx: broadcast::Sender<AttackFrame>,
}

impl FeedHub {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { event_tx }
    }

    /// Attach a subscriber. Only events published after this call arrive.
    pub fn subscribe(&self) -> broadcast::Receiver<AttackFrame> {
        self.event_tx.subscribe()
    }

    /// Fire-and-forget publish. A send with no subscribers is not an error.
    pub fn publish(&self, frame: AttackFrame) {
        let _ = self.event_tx.send(frame);
    }

    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }
}

impl Default for FeedHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "feed_tests.rs"]
mod tests;
