// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{create_block, reconcile_once, unblock};
use crate::error::HubError;
use crate::firewall::mock::FirewallCall;
use crate::model::{BlockScope, SuspiciousStatus};
use crate::test_support::{event_at, test_hub};

#[tokio::test]
async fn create_and_unblock_roundtrip() -> anyhow::Result<()> {
    let hub = test_hub().await;
    let ev = event_at("203.0.113.20", "administrator", "h-1", 0);
    hub.state.store.insert_event(&ev, None).await?;

    create_block(
        &hub.state,
        "203.0.113.20",
        BlockScope::Global,
        None,
        "manual block",
        chrono::Duration::minutes(60),
        "manual",
    )
    .await?;

    let suspicious = hub.state.store.suspicious(1).await?;
    assert!(suspicious.is_empty(), "blocked ips leave the active projection");

    let cleared = unblock(&hub.state, "203.0.113.20", "manual").await?;
    assert_eq!(cleared.len(), 1);
    assert_eq!(hub.firewall.remove_count(), 1);
    assert!(hub.state.store.active_blocks().await?.is_empty());

    // Second unblock: nothing active anymore.
    let again = unblock(&hub.state, "203.0.113.20", "manual").await;
    assert!(matches!(again, Err(HubError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn duplicate_global_block_is_rejected() -> anyhow::Result<()> {
    let hub = test_hub().await;
    create_block(
        &hub.state,
        "203.0.113.21",
        BlockScope::Global,
        None,
        "manual block",
        chrono::Duration::minutes(60),
        "manual",
    )
    .await?;

    let again = create_block(
        &hub.state,
        "203.0.113.21",
        BlockScope::Global,
        None,
        "manual block",
        chrono::Duration::minutes(60),
        "manual",
    )
    .await;
    assert!(matches!(again, Err(HubError::Validation(_))));
    assert_eq!(hub.state.store.count_active_blocks().await?, 1);
    Ok(())
}

#[tokio::test]
async fn per_host_block_requires_a_target() {
    let hub = test_hub().await;
    let result = create_block(
        &hub.state,
        "203.0.113.22",
        BlockScope::PerHost,
        None,
        "manual block",
        chrono::Duration::minutes(60),
        "manual",
    )
    .await;
    assert!(matches!(result, Err(HubError::Validation(_))));
}

#[tokio::test]
async fn expired_blocks_are_retired_within_one_pass() -> anyhow::Result<()> {
    let hub = test_hub().await;
    // Already past its expiry when the reconciler looks.
    create_block(
        &hub.state,
        "203.0.113.23",
        BlockScope::Global,
        None,
        "auto: threshold",
        chrono::Duration::seconds(-5),
        "auto",
    )
    .await?;
    assert_eq!(hub.state.store.count_active_blocks().await?, 1);

    reconcile_once(&hub.state).await?;

    assert_eq!(hub.state.store.count_active_blocks().await?, 0);
    let calls = hub.firewall.calls();
    assert!(calls.iter().any(|c| matches!(
        c,
        FirewallCall::Remove { ip, .. } if ip == "203.0.113.23"
    )));
    Ok(())
}

#[tokio::test]
async fn expiry_returns_suspicious_status_to_active() -> anyhow::Result<()> {
    let hub = test_hub().await;
    let ev = event_at("203.0.113.24", "administrator", "h-1", 0);
    hub.state.store.insert_event(&ev, None).await?;

    create_block(
        &hub.state,
        "203.0.113.24",
        BlockScope::Global,
        None,
        "auto: threshold",
        chrono::Duration::seconds(-5),
        "auto",
    )
    .await?;
    reconcile_once(&hub.state).await?;

    let suspicious = hub.state.store.suspicious(1).await?;
    assert_eq!(suspicious.len(), 1);
    assert_eq!(suspicious[0].status, SuspiciousStatus::Active);
    Ok(())
}

#[tokio::test]
async fn failed_apply_leaves_block_active_and_reconciler_retries() -> anyhow::Result<()> {
    let hub = test_hub().await;
    hub.firewall.set_fail_applies(true);

    let block = create_block(
        &hub.state,
        "203.0.113.25",
        BlockScope::Global,
        None,
        "manual block",
        chrono::Duration::minutes(60),
        "manual",
    )
    .await?;
    assert!(!block.firewall_applied);
    assert_eq!(hub.firewall.apply_count(), 0);
    assert_eq!(hub.state.store.count_active_blocks().await?, 1);

    // Adapter recovers; the next pass converges the rule.
    hub.firewall.set_fail_applies(false);
    reconcile_once(&hub.state).await?;

    assert_eq!(hub.firewall.apply_count(), 1);
    assert!(hub.state.store.unapplied_blocks().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn unblock_clears_both_scopes() -> anyhow::Result<()> {
    let hub = test_hub().await;
    hub.state.store.register_host("h-1", None, None, "agent").await?;

    create_block(
        &hub.state,
        "203.0.113.26",
        BlockScope::PerHost,
        Some("h-1"),
        "manual block",
        chrono::Duration::minutes(60),
        "manual",
    )
    .await?;
    create_block(
        &hub.state,
        "203.0.113.26",
        BlockScope::Global,
        None,
        "manual block",
        chrono::Duration::minutes(60),
        "manual",
    )
    .await?;

    let cleared = unblock(&hub.state, "203.0.113.26", "manual").await?;
    assert_eq!(cleared.len(), 2);
    assert_eq!(hub.firewall.remove_count(), 2);
    assert!(hub.state.store.active_blocks().await?.is_empty());
    Ok(())
}
