// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent event pipeline.
//!
//! Startup back-scan, then the wait/drain/safety-net/flush loop:
//!
//! ```text
//! observed → filtered? → drop
//!          → duplicate? → drop
//!          → queued → sent? → acknowledged   (fingerprints persisted)
//!                          → failed → retained for next cycle
//! ```
//!
//! Every error short of startup failure is absorbed and logged; the loop
//! keeps running through parse failures and collector outages.

use tokio_util::sync::CancellationToken;

use crate::clock;
use crate::config::AgentSettings;
use crate::parse;
use crate::queue::RetryQueue;
use crate::seen::{fingerprint, SeenSet};
use crate::ship::{CollectorClient, OutEvent};
use crate::source::{EventLogSource, Wake};

/// Outcome of admitting one rendered event.
enum Admitted {
    /// New event, normalized and fingerprinted.
    Fresh(Box<OutEvent>),
    /// Fingerprint already in the seen set.
    Duplicate,
    /// Filtered noise or unparseable; not fingerprinted.
    Skipped,
}

pub struct Pipeline<S: EventLogSource> {
    settings: AgentSettings,
    source: S,
    seen: SeenSet,
    queue: RetryQueue<OutEvent>,
    client: CollectorClient,
    /// Newest raw UTC system time processed; lower bound for the
    /// safety-net forward read.
    last_utc: Option<String>,
    shutdown: CancellationToken,
}

impl<S: EventLogSource> Pipeline<S> {
    pub fn new(settings: AgentSettings, source: S, shutdown: CancellationToken) -> Self {
        let seen = SeenSet::load(&settings.seen_path());
        let client = CollectorClient::new(settings.collector_url.clone());
        Self {
            settings,
            source,
            seen,
            queue: RetryQueue::new(),
            client,
            last_utc: None,
            shutdown,
        }
    }

    /// Run until shutdown: back-scan, then the subscription loop. On
    /// shutdown the queue gets one final best-effort flush.
    pub async fn run(mut self) -> anyhow::Result<()> {
        self.back_scan().await;
        self.flush().await;

        loop {
            let wake = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                wake = self.source.wait(self.settings.poll_interval) => wake,
            };

            match wake {
                Ok(Wake::Signaled) => self.drain_subscription().await,
                Ok(Wake::TimedOut) => {}
                Err(e) => {
                    tracing::warn!(err = %e, "subscription wait failed, falling back to poll");
                }
            }

            // Safety net: a forward snapshot regardless of the signal, so
            // anything the notification mechanism missed is captured
            // within one poll interval.
            self.safety_net_pull().await;
            self.flush().await;
        }

        tracing::info!(pending = self.queue.len(), "shutting down, final flush");
        self.flush().await;
        Ok(())
    }

    /// Reverse-chronological scan of the channel at startup. Stops as soon
    /// as an entire read batch is already fingerprinted, so restart cost
    /// tracks downtime, not total log size.
    async fn back_scan(&mut self) {
        let batch_size = self.settings.read_batch;
        let mut offset = 0usize;
        let mut recovered: Vec<OutEvent> = Vec::new();

        loop {
            let batch = match self.source.read_reverse(offset, batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(err = %e, "back-scan read failed");
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }
            offset += batch.len();

            // Stop once an entire read batch is already fingerprinted:
            // everything older was covered by a previous run. Filtered
            // noise neither extends nor ends the scan.
            let mut all_known = true;
            for xml in &batch {
                match self.admit(xml) {
                    Admitted::Fresh(event) => {
                        all_known = false;
                        recovered.push(*event);
                    }
                    Admitted::Duplicate => {}
                    Admitted::Skipped => all_known = false,
                }
            }
            if all_known {
                break;
            }
        }

        // The scan walked newest-first; ship oldest-first.
        recovered.reverse();
        let count = recovered.len();
        for event in recovered {
            self.queue.push(event);
        }
        if count > 0 {
            tracing::info!(events = count, "back-scan recovered events");
        }
    }

    /// Drain all available events from the live subscription.
    async fn drain_subscription(&mut self) {
        loop {
            let batch = match self.source.next_batch(self.settings.read_batch).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(err = %e, "subscription read failed");
                    return;
                }
            };
            if batch.is_empty() {
                return;
            }
            for xml in &batch {
                if let Admitted::Fresh(event) = self.admit(xml) {
                    self.queue.push(*event);
                }
            }
        }
    }

    /// Forward snapshot read since the last processed event.
    async fn safety_net_pull(&mut self) {
        let since = self.last_utc.clone();
        let batch = match self.source.read_since(since.as_deref(), self.settings.read_batch).await
        {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(err = %e, "safety-net read failed");
                return;
            }
        };
        for xml in &batch {
            if let Admitted::Fresh(event) = self.admit(xml) {
                self.queue.push(*event);
            }
        }
    }

    /// Parse, filter, deduplicate, and normalize one rendered event.
    fn admit(&mut self, xml: &str) -> Admitted {
        let parsed = match parse::parse_event(xml) {
            Ok(Some(parsed)) => parsed,
            // Loopback/empty-source noise.
            Ok(None) => return Admitted::Skipped,
            Err(e) => {
                tracing::warn!(err = %e, "skipping unparseable event");
                return Admitted::Skipped;
            }
        };

        let fp = fingerprint(
            &parsed.raw_utc,
            &parsed.source_ip,
            parsed.target_username.as_deref().unwrap_or(""),
            &parsed.source_port.map(|p| p.to_string()).unwrap_or_default(),
        );
        if self.seen.contains(&fp) {
            return Admitted::Duplicate;
        }

        let Some(event_timestamp) = clock::to_local_civil(&parsed.raw_utc) else {
            tracing::warn!(ts = %parsed.raw_utc, "skipping event with malformed system time");
            return Admitted::Skipped;
        };

        self.seen.insert(fp);
        if self.last_utc.as_deref().is_none_or(|last| parsed.raw_utc.as_str() > last) {
            self.last_utc = Some(parsed.raw_utc.clone());
        }

        Admitted::Fresh(Box::new(OutEvent {
            source_ip: parsed.source_ip,
            target_username: parsed.target_username,
            source_host_name: parsed.source_host_name,
            logon_type: parsed.logon_type,
            failure_reason: parsed.failure_reason,
            source_port: parsed.source_port,
            event_timestamp,
            event_class: parsed.event_id.unwrap_or(i64::from(self.settings.event_id)),
        }))
    }

    /// Ship everything pending as one batch. Acknowledgement clears the
    /// queue and persists the fingerprint set; failure retains the queue
    /// for the next cycle.
    async fn flush(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let events: Vec<OutEvent> = self.queue.pending().cloned().collect();
        match self
            .client
            .post_events(&self.settings.host_id, &self.settings.host_name, &events)
            .await
        {
            Ok(accepted) => {
                tracing::debug!(sent = events.len(), accepted, "batch acknowledged");
                self.queue.clear();
                if let Err(e) = self.seen.persist() {
                    tracing::warn!(err = %e, "failed to persist seen set");
                }
            }
            Err(e) => {
                tracing::warn!(pending = self.queue.len(), err = %e, "collector unreachable, retaining queue");
            }
        }
    }

    /// Pending events (tests).
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Fingerprints currently held (tests).
    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
