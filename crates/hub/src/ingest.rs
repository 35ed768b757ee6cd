// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch ingestion: validate, persist idempotently, then hand each admitted
//! record to detection and the live feed.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::detect;
use crate::error::HubError;
use crate::feed::AttackFrame;
use crate::model::{clip_failure_reason, FailedLogin, FAILED_LOGIN_EVENT_CLASS};
use crate::state::HubState;
use crate::storage::Admit;

/// Source addresses that are log noise, never telemetry.
const NOISE_SOURCES: &[&str] = &["", "-", "0.0.0.0", "::1", "127.0.0.1"];

/// Inbound batch: `{host_id, host_name, events: [...]}`.
#[derive(Debug, Deserialize)]
pub struct IngestBatch {
    pub host_id: String,
    #[serde(default)]
    pub host_name: Option<String>,
    #[serde(default)]
    pub events: Vec<IngestEvent>,
}

/// One event on the wire. Everything but `source_ip` and the timestamp is
/// optional; the timestamp is host-local civil time as a string so the
/// agent's fractional-second precision survives transport untouched.
#[derive(Debug, Deserialize)]
pub struct IngestEvent {
    pub source_ip: String,
    #[serde(default)]
    pub target_username: Option<String>,
    #[serde(default)]
    pub source_host_name: Option<String>,
    #[serde(default)]
    pub logon_type: Option<i64>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub source_port: Option<i64>,
    pub event_timestamp: String,
    #[serde(default)]
    pub event_class: Option<i64>,
}

/// Accept a batch. Returns the number of newly persisted records;
/// duplicates and skipped events never fail the batch.
pub async fn ingest_batch(state: &Arc<HubState>, batch: IngestBatch) -> Result<i64, HubError> {
    if batch.host_id.trim().is_empty() {
        return Err(HubError::Validation("host_id is required".into()));
    }

    let mut accepted = 0i64;
    for event in batch.events {
        let Some(record) = sanitize(event, &batch.host_id) else {
            continue;
        };

        let admit = state.store.insert_event(&record, batch.host_name.as_deref()).await?;
        let Admit::Inserted { attempt_number } = admit else {
            continue;
        };
        accepted += 1;

        // Post-commit work runs on a detached task so a dropped client
        // connection cannot cancel it; the await keeps it in the request
        // flow for callers that outlive it.
        let state = Arc::clone(state);
        let handle = tokio::spawn(async move {
            state.feed.publish(AttackFrame {
                source_ip: record.source_ip.clone(),
                target_username: record.target_username.clone(),
                event_timestamp: record.event_timestamp,
                attempt_number,
            });
            if let Err(e) = detect::evaluate(&state, &record).await {
                tracing::warn!(ip = %record.source_ip, err = %e, "detection failed");
            }
        });
        let _ = handle.await;
    }

    Ok(accepted)
}

/// Validate and convert one wire event. `None` means the event is skipped:
/// loopback/empty-source noise silently, malformed fields with a WARN.
fn sanitize(event: IngestEvent, host_id: &str) -> Option<FailedLogin> {
    let source_ip = event.source_ip.trim();
    if NOISE_SOURCES.contains(&source_ip) {
        return None;
    }
    if source_ip.parse::<std::net::IpAddr>().is_err() {
        tracing::warn!(ip = %source_ip, host = %host_id, "skipping event with unparseable source ip");
        return None;
    }
    let Some(event_timestamp) = parse_civil_timestamp(&event.event_timestamp) else {
        tracing::warn!(
            ts = %event.event_timestamp,
            host = %host_id,
            "skipping event with malformed timestamp"
        );
        return None;
    };

    Some(FailedLogin {
        source_ip: source_ip.to_owned(),
        target_username: event.target_username.filter(|u| !u.is_empty()),
        source_host_name: event.source_host_name.filter(|h| !h.is_empty()),
        logon_type: event.logon_type,
        failure_reason: clip_failure_reason(event.failure_reason),
        source_port: event.source_port,
        event_timestamp,
        host_id: host_id.to_owned(),
        event_class: event.event_class.unwrap_or(FAILED_LOGIN_EVENT_CLASS),
    })
}

/// Parse a civil timestamp with 0-7 fractional digits, `T` or space
/// separated.
pub fn parse_civil_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
