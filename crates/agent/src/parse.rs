// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Field extraction from rendered security-event XML.
//!
//! Events arrive as the channel's XML rendering; the named `<Data>` fields
//! and the `SystemTime` attribute are all the pipeline needs, so extraction
//! is regex-based rather than a full XML parse.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Source addresses that are loopback or empty-source noise, dropped
/// silently before fingerprinting.
const NOISE_SOURCES: &[&str] = &["", "-", "0.0.0.0", "::1", "127.0.0.1"];

/// One authentication failure extracted from event XML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    /// `SystemTime` attribute verbatim; fingerprint input, never shipped.
    pub raw_utc: String,
    pub source_ip: String,
    pub target_username: Option<String>,
    pub target_domain: Option<String>,
    pub logon_type: Option<i64>,
    pub failure_reason: Option<String>,
    pub source_host_name: Option<String>,
    pub source_port: Option<i64>,
    pub event_id: Option<i64>,
}

#[allow(clippy::expect_used)]
fn data_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<Data Name=['"]([^'"]+)['"]\s*>([^<]*)</Data>"#).expect("static regex")
    })
}

#[allow(clippy::expect_used)]
fn system_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"SystemTime=['"]([^'"]+)['"]"#).expect("static regex"))
}

#[allow(clippy::expect_used)]
fn event_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<EventID[^>]*>(\d+)</EventID>").expect("static regex"))
}

/// Extract the `SystemTime` attribute from rendered event XML.
pub fn extract_system_time(xml: &str) -> Option<&str> {
    system_time_re().captures(xml).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Parse one rendered event.
///
/// `Ok(None)` means the event was filtered (loopback or empty source);
/// `Err` means the XML is missing the pieces the pipeline cannot work
/// without. Either way the caller moves on to the next event.
pub fn parse_event(xml: &str) -> anyhow::Result<Option<ParsedEvent>> {
    let raw_utc = extract_system_time(xml)
        .ok_or_else(|| anyhow::anyhow!("event has no SystemTime attribute"))?
        .to_owned();

    let mut fields: HashMap<&str, &str> = HashMap::new();
    for captures in data_field_re().captures_iter(xml) {
        if let (Some(name), Some(value)) = (captures.get(1), captures.get(2)) {
            fields.insert(name.as_str(), value.as_str());
        }
    }

    let source_ip = fields.get("IpAddress").copied().unwrap_or("").trim();
    if NOISE_SOURCES.contains(&source_ip) {
        return Ok(None);
    }

    let text = |name: &str| -> Option<String> {
        fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty() && *v != "-")
            .map(str::to_owned)
    };
    let number = |name: &str| -> Option<i64> { fields.get(name).and_then(|v| v.trim().parse().ok()) };

    Ok(Some(ParsedEvent {
        raw_utc,
        source_ip: source_ip.to_owned(),
        target_username: text("TargetUserName"),
        target_domain: text("TargetDomainName"),
        logon_type: number("LogonType"),
        failure_reason: text("Status"),
        source_host_name: text("WorkstationName"),
        source_port: number("IpPort"),
        event_id: event_id_re()
            .captures(xml)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok()),
    }))
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;
