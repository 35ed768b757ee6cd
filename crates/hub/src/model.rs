// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent entities owned by the hub.
//!
//! All civil timestamps are `NaiveDateTime`: event times arrive already
//! normalized to the reporting host's local time, and the hub's own
//! bookkeeping uses its local wall clock.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Platform event code for an authentication failure.
pub const FAILED_LOGIN_EVENT_CLASS: i64 = 4625;

/// `failure_reason` is a short opaque status string (e.g. `0xC000006A`).
/// It is never coerced to an integer; an NTSTATUS overflows i32.
pub const FAILURE_REASON_MAX_LEN: usize = 20;

/// One authentication-failure record. Written once, never mutated.
///
/// `(source_ip, target_username, source_port, event_timestamp, host_id)` is
/// the natural key; duplicates are dropped silently at persistence time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedLogin {
    pub source_ip: String,
    pub target_username: Option<String>,
    pub source_host_name: Option<String>,
    pub logon_type: Option<i64>,
    pub failure_reason: Option<String>,
    pub source_port: Option<i64>,
    pub event_timestamp: NaiveDateTime,
    pub host_id: String,
    pub event_class: i64,
}

/// Lifetime counter per source IP, kept for the dashboard projections.
///
/// Never consulted for threshold decisions; those always come from windowed
/// counts over `failed_logins`.
#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousIp {
    pub source_ip: String,
    pub lifetime_failure_count: i64,
    pub first_seen: NaiveDateTime,
    pub last_seen: NaiveDateTime,
    pub status: SuspiciousStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspiciousStatus {
    Active,
    Blocked,
    Cleared,
}

impl SuspiciousStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::Cleared => "cleared",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "blocked" => Self::Blocked,
            "cleared" => Self::Cleared,
            _ => Self::Active,
        }
    }
}

/// A monitored host known to the hub.
#[derive(Debug, Clone, Serialize)]
pub struct Host {
    pub host_id: String,
    pub host_name: Option<String>,
    pub host_ip: Option<String>,
    pub collection_method: String,
    pub status: String,
    pub last_seen: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// Whether a block applies at the network perimeter or to a single host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockScope {
    #[serde(rename = "global")]
    Global,
    #[serde(rename = "per-host")]
    PerHost,
}

impl BlockScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::PerHost => "per-host",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "per-host" => Self::PerHost,
            _ => Self::Global,
        }
    }
}

/// Record of an IP block decision.
#[derive(Debug, Clone, Serialize)]
pub struct Block {
    pub id: i64,
    pub source_ip: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub reason: String,
    pub created_by: String,
    pub is_active: bool,
    pub cleared_at: Option<NaiveDateTime>,
    pub cleared_by: Option<String>,
    pub scope: BlockScope,
    pub target_host_id: Option<String>,
    /// Whether the firewall adapter has confirmed the matching rule.
    /// Reconciled in the background until true.
    pub firewall_applied: bool,
}

/// Optional per-host override of the global policy. NULL fields inherit.
#[derive(Debug, Clone, Default)]
pub struct PerHostPolicy {
    pub host_id: String,
    pub threshold: Option<i64>,
    pub window_seconds: Option<i64>,
    pub block_duration_seconds: Option<i64>,
    pub auto_block_enabled: Option<bool>,
}

/// Recognized settings keys. The table is the runtime source of truth;
/// config values only seed missing rows.
pub mod settings {
    pub const THRESHOLD: &str = "THRESHOLD";
    pub const TIME_WINDOW: &str = "TIME_WINDOW";
    pub const BLOCK_DURATION: &str = "BLOCK_DURATION";
    pub const ENABLE_AUTO_BLOCK: &str = "ENABLE_AUTO_BLOCK";
    pub const GLOBAL_THRESHOLD: &str = "GLOBAL_THRESHOLD";
    pub const ENABLE_GLOBAL_AUTO_BLOCK: &str = "ENABLE_GLOBAL_AUTO_BLOCK";
}

/// Truncate a failure reason to its bounded storage form.
pub fn clip_failure_reason(reason: Option<String>) -> Option<String> {
    reason.map(|r| {
        if r.len() <= FAILURE_REASON_MAX_LEN {
            return r;
        }
        let mut end = FAILURE_REASON_MAX_LEN;
        while !r.is_char_boundary(end) {
            end -= 1;
        }
        r[..end].to_owned()
    })
}
