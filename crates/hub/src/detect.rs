// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rolling-window brute-force detection.
//!
//! Runs once per admitted event, after the ingestion transaction commits.
//! Threshold inputs are always windowed counts over `failed_logins`; the
//! lifetime counter on `suspicious_ips` is display-only and would let a
//! long-idle IP re-trigger on a single new attempt.

use chrono::Duration;

use crate::blocks;
use crate::error::HubError;
use crate::model::{settings, BlockScope, FailedLogin};
use crate::state::HubState;
use crate::storage::now_local;

/// Policy for one host after merging its override row with the global
/// settings. Units follow the stores they come from: settings are minutes,
/// per-host overrides are seconds.
#[derive(Debug, Clone, Copy)]
struct EffectivePolicy {
    threshold: i64,
    window: Duration,
    block_duration: Duration,
    auto_block_enabled: bool,
}

/// Evaluate both block policies for one admitted event.
pub async fn evaluate(state: &HubState, ev: &FailedLogin) -> Result<(), HubError> {
    // An active global block already covers every host for this IP.
    if state.store.active_global_block(&ev.source_ip).await?.is_some() {
        return Ok(());
    }

    if evaluate_global(state, ev).await? {
        // Tie-break: when both policies would trigger from the same event,
        // only the global block is created.
        return Ok(());
    }
    evaluate_per_host(state, ev).await
}

async fn evaluate_global(state: &HubState, ev: &FailedLogin) -> Result<bool, HubError> {
    let cfg = &state.config;
    let enabled = state
        .store
        .setting_bool(settings::ENABLE_GLOBAL_AUTO_BLOCK, cfg.enable_global_auto_block)
        .await?;
    if !enabled {
        return Ok(false);
    }

    let fallback_threshold =
        state.store.setting_i64(settings::THRESHOLD, cfg.threshold).await?;
    let threshold = state
        .store
        .setting_i64(settings::GLOBAL_THRESHOLD, fallback_threshold)
        .await?;
    let window_minutes =
        state.store.setting_i64(settings::TIME_WINDOW, cfg.time_window).await?;
    let window = Duration::minutes(window_minutes.max(1));

    // Half-open window [now - W, now], inclusive at both ends.
    let now = now_local();
    let count = state.store.count_ip_window(&ev.source_ip, now - window, now).await?;
    if count < threshold {
        return Ok(false);
    }

    let duration_minutes =
        state.store.setting_i64(settings::BLOCK_DURATION, cfg.block_duration).await?;
    let reason =
        format!("auto: {count} failed logins across hosts within {window_minutes} min");
    blocks::create_block(
        state,
        &ev.source_ip,
        BlockScope::Global,
        None,
        &reason,
        Duration::minutes(duration_minutes.max(1)),
        "auto",
    )
    .await?;
    Ok(true)
}

async fn evaluate_per_host(state: &HubState, ev: &FailedLogin) -> Result<(), HubError> {
    let policy = effective_policy(state, &ev.host_id).await?;
    if !policy.auto_block_enabled {
        return Ok(());
    }
    if state.store.active_host_block(&ev.source_ip, &ev.host_id).await?.is_some() {
        return Ok(());
    }

    let now = now_local();
    let count = state
        .store
        .count_ip_host_window(&ev.source_ip, &ev.host_id, now - policy.window, now)
        .await?;
    if count < policy.threshold {
        return Ok(());
    }

    let reason = format!(
        "auto: {count} failed logins against {} within {}s",
        ev.host_id,
        policy.window.num_seconds()
    );
    blocks::create_block(
        state,
        &ev.source_ip,
        BlockScope::PerHost,
        Some(&ev.host_id),
        &reason,
        policy.block_duration,
        "auto",
    )
    .await?;
    Ok(())
}

async fn effective_policy(state: &HubState, host_id: &str) -> Result<EffectivePolicy, HubError> {
    let cfg = &state.config;
    let threshold = state.store.setting_i64(settings::THRESHOLD, cfg.threshold).await?;
    let window_minutes = state.store.setting_i64(settings::TIME_WINDOW, cfg.time_window).await?;
    let duration_minutes =
        state.store.setting_i64(settings::BLOCK_DURATION, cfg.block_duration).await?;
    let enabled =
        state.store.setting_bool(settings::ENABLE_AUTO_BLOCK, cfg.enable_auto_block).await?;

    let override_row = state.store.per_host_policy(host_id).await?;
    let (threshold, window, block_duration, auto_block_enabled) = match override_row {
        Some(p) => (
            p.threshold.unwrap_or(threshold),
            p.window_seconds
                .map(|s| Duration::seconds(s.max(1)))
                .unwrap_or_else(|| Duration::minutes(window_minutes.max(1))),
            p.block_duration_seconds
                .map(|s| Duration::seconds(s.max(1)))
                .unwrap_or_else(|| Duration::minutes(duration_minutes.max(1))),
            p.auto_block_enabled.unwrap_or(enabled),
        ),
        None => (
            threshold,
            Duration::minutes(window_minutes.max(1)),
            Duration::minutes(duration_minutes.max(1)),
            enabled,
        ),
    };

    Ok(EffectivePolicy { threshold, window, block_duration, auto_block_enabled })
}

#[cfg(test)]
#[path = "detect_tests.rs"]
mod tests;
