// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: in-memory hub states and event builders.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::firewall::mock::MockFirewall;
use crate::model::{FailedLogin, FAILED_LOGIN_EVENT_CLASS};
use crate::state::HubState;
use crate::storage::{now_local, Store};

/// A hub wired to an ephemeral database and a recording firewall.
pub struct TestHub {
    pub state: Arc<HubState>,
    pub firewall: Arc<MockFirewall>,
}

/// Config pointing at `sqlite::memory:` with fast defaults.
pub fn test_config() -> HubConfig {
    HubConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        db_dsn: "sqlite::memory:".to_owned(),
        base_path: "/api/v1".to_owned(),
        threshold: 5,
        time_window: 5,
        block_duration: 60,
        enable_auto_block: true,
        global_threshold: None,
        enable_global_auto_block: true,
        reconciler_interval_secs: 1,
    }
}

pub async fn test_hub() -> TestHub {
    test_hub_with(test_config()).await
}

#[allow(clippy::expect_used)]
pub async fn test_hub_with(config: HubConfig) -> TestHub {
    let store = Store::connect(&config).await.expect("open in-memory store");
    let firewall = Arc::new(MockFirewall::new());
    let state = Arc::new(HubState::new(
        config,
        store,
        Arc::clone(&firewall) as Arc<dyn crate::firewall::FirewallAdapter>,
        CancellationToken::new(),
    ));
    TestHub { state, firewall }
}

/// A failed-login record `secs_ago` seconds before now.
pub fn event_at(ip: &str, username: &str, host_id: &str, secs_ago: i64) -> FailedLogin {
    event_with_port(ip, username, host_id, secs_ago, Some(50234))
}

pub fn event_with_port(
    ip: &str,
    username: &str,
    host_id: &str,
    secs_ago: i64,
    source_port: Option<i64>,
) -> FailedLogin {
    FailedLogin {
        source_ip: ip.to_owned(),
        target_username: Some(username.to_owned()),
        source_host_name: Some("ATTACKER-PC".to_owned()),
        logon_type: Some(3),
        failure_reason: Some("0xC000006A".to_owned()),
        source_port,
        event_timestamp: civil_secs_ago(secs_ago),
        host_id: host_id.to_owned(),
        event_class: FAILED_LOGIN_EVENT_CLASS,
    }
}

pub fn civil_secs_ago(secs: i64) -> NaiveDateTime {
    now_local() - chrono::Duration::seconds(secs)
}
