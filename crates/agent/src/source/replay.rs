// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted in-memory channel for tests.
//!
//! Tests hold a [`ReplayHandle`] to append events and raise the signal
//! while the pipeline owns the [`ReplaySource`] end.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{EventLogSource, Wake};
use crate::parse::extract_system_time;

#[derive(Default)]
struct Inner {
    /// Full channel contents, oldest first.
    log: Vec<String>,
    /// Live-subscription cursor into `log`.
    cursor: usize,
    /// Pending signal from an append.
    signaled: bool,
    /// Reverse-read pages served, for back-scan assertions.
    reverse_reads: usize,
}

/// Test-side control over a [`ReplaySource`].
#[derive(Clone, Default)]
pub struct ReplayHandle {
    inner: Arc<Mutex<Inner>>,
}

impl ReplayHandle {
    /// Append a rendered event and raise the subscription signal.
    pub fn append(&self, xml: impl Into<String>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.log.push(xml.into());
            inner.signaled = true;
        }
    }

    /// Append without signaling: the notification mechanism "missed"
    /// this event and only the safety-net read can find it.
    pub fn append_silently(&self, xml: impl Into<String>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.log.push(xml.into());
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many reverse-read pages the back-scan requested.
    pub fn reverse_read_count(&self) -> usize {
        self.inner.lock().map(|i| i.reverse_reads).unwrap_or(0)
    }
}

/// Pipeline-side end of the scripted channel.
pub struct ReplaySource {
    inner: Arc<Mutex<Inner>>,
}

impl ReplaySource {
    /// Create a source plus its test handle.
    pub fn new() -> (Self, ReplayHandle) {
        let handle = ReplayHandle::default();
        (Self { inner: Arc::clone(&handle.inner) }, handle)
    }

    /// Pre-populate the channel (history present before the agent starts)
    /// without signaling.
    pub fn with_history(history: Vec<String>) -> (Self, ReplayHandle) {
        let (source, handle) = Self::new();
        if let Ok(mut inner) = handle.inner.lock() {
            inner.log = history;
            // The subscription only covers future events.
            inner.cursor = inner.log.len();
        }
        (source, handle)
    }

    fn locked<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> anyhow::Result<R> {
        self.inner
            .lock()
            .map(|mut inner| f(&mut inner))
            .map_err(|_| anyhow::anyhow!("replay channel poisoned"))
    }
}

#[async_trait]
impl EventLogSource for ReplaySource {
    async fn wait(&mut self, timeout: Duration) -> anyhow::Result<Wake> {
        let signaled = self.locked(|inner| std::mem::take(&mut inner.signaled))?;
        if signaled {
            return Ok(Wake::Signaled);
        }
        // Tests keep poll intervals tiny; a capped sleep keeps them fast
        // even when configured otherwise.
        tokio::time::sleep(timeout.min(Duration::from_millis(20))).await;
        let signaled = self.locked(|inner| std::mem::take(&mut inner.signaled))?;
        Ok(if signaled { Wake::Signaled } else { Wake::TimedOut })
    }

    async fn next_batch(&mut self, max: usize) -> anyhow::Result<Vec<String>> {
        self.locked(|inner| {
            let end = inner.log.len().min(inner.cursor + max);
            let batch = inner.log[inner.cursor..end].to_vec();
            inner.cursor = end;
            batch
        })
    }

    async fn read_reverse(&mut self, offset: usize, max: usize) -> anyhow::Result<Vec<String>> {
        self.locked(|inner| {
            inner.reverse_reads += 1;
            inner.log.iter().rev().skip(offset).take(max).cloned().collect()
        })
    }

    async fn read_since(
        &mut self,
        since: Option<&str>,
        max: usize,
    ) -> anyhow::Result<Vec<String>> {
        self.locked(|inner| match since {
            Some(bound) => inner
                .log
                .iter()
                .filter(|xml| extract_system_time(xml).is_some_and(|ts| ts > bound))
                .take(max)
                .cloned()
                .collect(),
            None => {
                let skip = inner.log.len().saturating_sub(max);
                inner.log.iter().skip(skip).cloned().collect()
            }
        })
    }
}
