// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Security-channel access behind a pull-model seam.
//!
//! The OS subscription API exposes a signal handle plus bounded reads; the
//! trait mirrors that shape so the pipeline stays on one thread of control
//! and test doubles can script the channel exactly.

pub mod replay;
pub mod wevtutil;

use std::time::Duration;

use async_trait::async_trait;

/// Why a subscription wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The channel signaled at least one new matching event.
    Signaled,
    /// The poll interval elapsed. The caller still performs its safety-net
    /// snapshot read so missed notifications cost at most one interval.
    TimedOut,
}

/// Pull-model access to the security event channel. Events are the
/// channel's XML renderings.
#[async_trait]
pub trait EventLogSource: Send {
    /// Block until the channel signals a new matching event or the
    /// timeout elapses. Sources without a signal handle always time out,
    /// which degrades the loop to the documented pure-poll mode.
    async fn wait(&mut self, timeout: Duration) -> anyhow::Result<Wake>;

    /// Next bounded read from the live subscription cursor. Empty means
    /// the cursor is caught up.
    async fn next_batch(&mut self, max: usize) -> anyhow::Result<Vec<String>>;

    /// Snapshot read in reverse chronological order, for the startup
    /// back-scan. `offset` skips the newest events already scanned.
    async fn read_reverse(&mut self, offset: usize, max: usize) -> anyhow::Result<Vec<String>>;

    /// Forward snapshot of events strictly newer than `since` (a raw UTC
    /// system time). `None` reads the newest `max` events.
    async fn read_since(&mut self, since: Option<&str>, max: usize)
        -> anyhow::Result<Vec<String>>;
}
