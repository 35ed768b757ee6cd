// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Block manager: create/unblock operations and the expiry reconciler.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::error::HubError;
use crate::firewall::FirewallError;
use crate::model::{Block, BlockScope};
use crate::state::HubState;
use crate::storage::now_local;

/// Create a block, push the firewall rule, and mark the IP blocked.
///
/// An adapter failure does not undo the row: the record stays active with
/// `firewall_applied = false` and the reconciler retries the rule.
pub async fn create_block(
    state: &HubState,
    ip: &str,
    scope: BlockScope,
    target_host_id: Option<&str>,
    reason: &str,
    duration: chrono::Duration,
    created_by: &str,
) -> Result<Block, HubError> {
    if state.store.active_global_block(ip).await?.is_some() {
        return Err(HubError::Validation(format!("{ip} already has an active global block")));
    }
    if scope == BlockScope::PerHost {
        let host = target_host_id
            .ok_or_else(|| HubError::Validation("per-host block requires a target host".into()))?;
        if state.store.active_host_block(ip, host).await?.is_some() {
            return Err(HubError::Validation(format!(
                "{ip} already has an active block for host {host}"
            )));
        }
    }

    let expires_at: NaiveDateTime = now_local() + duration;
    let block = state
        .store
        .create_block(ip, scope, target_host_id, reason, expires_at, created_by)
        .await?;
    tracing::info!(
        ip = %ip,
        scope = scope.as_str(),
        host = ?target_host_id,
        by = created_by,
        "block created"
    );

    match state.firewall.apply(ip, scope, target_host_id).await {
        Ok(()) => state.store.mark_firewall_applied(block.id).await?,
        Err(e @ FirewallError::Transient(_)) => {
            tracing::warn!(ip = %ip, err = %e, "firewall apply failed, reconciler will retry");
        }
        Err(e @ FirewallError::Permanent(_)) => {
            tracing::error!(ip = %ip, err = %e, "firewall apply failed permanently, operator action required");
        }
    }

    Ok(block)
}

/// Deactivate every active block for an IP and remove the firewall rules.
/// `NotFound` when no active block existed.
pub async fn unblock(state: &HubState, ip: &str, cleared_by: &str) -> Result<Vec<Block>, HubError> {
    let cleared = state.store.clear_blocks_for_ip(ip, cleared_by).await?;
    if cleared.is_empty() {
        return Err(HubError::NotFound(format!("no active block for {ip}")));
    }

    for block in &cleared {
        if let Err(e) =
            state.firewall.remove(ip, block.scope, block.target_host_id.as_deref()).await
        {
            tracing::warn!(ip = %ip, err = %e, "firewall remove failed");
        }
    }
    tracing::info!(ip = %ip, count = cleared.len(), by = cleared_by, "blocks cleared");
    Ok(cleared)
}

/// Spawn the background reconciler: retires expired blocks and retries
/// unconfirmed firewall rules. One pass per interval, skipping missed ticks.
pub fn spawn_expiry_reconciler(state: Arc<HubState>) {
    let interval = state.config.reconciler_interval();
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            if let Err(e) = reconcile_once(&state).await {
                tracing::warn!(err = %e, "reconciler pass failed");
            }
        }
    });
}

/// One reconciler pass, bounded so a slow adapter cannot wedge the task.
pub async fn reconcile_once(state: &HubState) -> Result<(), HubError> {
    let budget = Duration::from_secs(5);
    match tokio::time::timeout(budget, reconcile_pass(state)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("reconciler pass exceeded its budget, retrying next interval");
            Ok(())
        }
    }
}

async fn reconcile_pass(state: &HubState) -> Result<(), HubError> {
    let now = now_local();

    for block in state.store.expired_blocks(now).await? {
        state.store.expire_block(block.id).await?;
        tracing::info!(ip = %block.source_ip, scope = block.scope.as_str(), "block expired");
        if let Err(e) = state
            .firewall
            .remove(&block.source_ip, block.scope, block.target_host_id.as_deref())
            .await
        {
            tracing::warn!(ip = %block.source_ip, err = %e, "firewall remove failed on expiry");
        }
    }

    for block in state.store.unapplied_blocks().await? {
        match state
            .firewall
            .apply(&block.source_ip, block.scope, block.target_host_id.as_deref())
            .await
        {
            Ok(()) => {
                state.store.mark_firewall_applied(block.id).await?;
                tracing::info!(ip = %block.source_ip, "firewall rule reconciled");
            }
            Err(e @ FirewallError::Transient(_)) => {
                tracing::warn!(ip = %block.source_ip, err = %e, "firewall apply retry failed");
            }
            Err(e @ FirewallError::Permanent(_)) => {
                tracing::error!(ip = %block.source_ip, err = %e, "firewall apply failed permanently");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "blocks_tests.rs"]
mod tests;
