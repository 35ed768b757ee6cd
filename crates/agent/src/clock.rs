// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timestamp normalization: UTC system time → host-local civil time.
//!
//! The channel reports up to seven fractional-second digits. The local
//! rendering keeps exactly the digits the source had (no truncation, no
//! padding) because the collector treats the transmitted string as part
//! of the event's identity.

use chrono::{NaiveDateTime, TimeZone};

/// Number of fractional-second digits in a raw UTC string (0-7 on the
/// reference platform; capped at 9 defensively for nanosecond math).
pub fn fraction_digits(raw: &str) -> usize {
    let Some(dot) = raw.find('.') else {
        return 0;
    };
    raw[dot + 1..].chars().take_while(char::is_ascii_digit).count().min(9)
}

/// Parse a raw UTC system time such as `2026-08-01T10:00:00.1234567Z`.
pub fn parse_utc(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// Render `dt` with exactly `digits` fractional digits.
pub fn format_with_precision(dt: NaiveDateTime, digits: usize) -> String {
    use chrono::Timelike;
    let base = dt.format("%Y-%m-%dT%H:%M:%S").to_string();
    if digits == 0 {
        return base;
    }
    let digits = digits.min(9);
    let nanos = dt.nanosecond() % 1_000_000_000;
    let frac = nanos / 10u32.pow(9 - digits as u32);
    format!("{base}.{frac:0width$}", width = digits)
}

/// Convert a raw UTC string into civil time in `tz`, preserving the
/// source's fractional precision.
pub fn localize_in<Tz: TimeZone>(raw_utc: &str, tz: &Tz) -> Option<String> {
    let utc = parse_utc(raw_utc)?;
    let local = tz.from_utc_datetime(&utc).naive_local();
    Some(format_with_precision(local, fraction_digits(raw_utc)))
}

/// Convert a raw UTC string into this host's local civil time.
pub fn to_local_civil(raw_utc: &str) -> Option<String> {
    localize_in(raw_utc, &chrono::Local)
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
