// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end scenario tests.
//!
//! Serves a real hub on a loopback TCP port (ephemeral database,
//! recording firewall) and drives the real agent pipeline against it
//! over HTTP.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use vigilhub::firewall::mock::MockFirewall;
use vigilhub::state::HubState;
use vigilhub::test_support::{test_hub_with, TestHub};
use vigilhub::transport::build_router;

/// A hub served over real TCP, with handles into its internals.
pub struct SpecHub {
    pub url: String,
    pub state: Arc<HubState>,
    pub firewall: Arc<MockFirewall>,
}

/// Serve a hub with the default test policy (threshold 5, 5-minute
/// window, 60-minute blocks).
pub async fn spawn_hub() -> anyhow::Result<SpecHub> {
    spawn_hub_with(vigilhub::test_support::test_config()).await
}

pub async fn spawn_hub_with(config: vigilhub::config::HubConfig) -> anyhow::Result<SpecHub> {
    let TestHub { state, firewall } = test_hub_with(config).await;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}", listener.local_addr()?);
    let router = build_router(Arc::clone(&state));
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let hub = SpecHub { url, state, firewall };
    hub.wait_healthy(Duration::from_secs(5)).await?;
    Ok(hub)
}

impl SpecHub {
    pub fn api(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.url, path)
    }

    /// Poll `/health` until the hub responds.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("hub did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(self.api("/health")).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Total persisted failed logins, via the statistics endpoint.
    pub async fn total_attempts(&self) -> anyhow::Result<i64> {
        let body: serde_json::Value =
            reqwest::get(self.api("/statistics")).await?.json().await?;
        body["statistics"]["total_attempts"]
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("malformed statistics body"))
    }

    /// Currently active blocks, via the blocked-ips endpoint.
    pub async fn blocked_ips(&self) -> anyhow::Result<Vec<serde_json::Value>> {
        let body: serde_json::Value =
            reqwest::get(self.api("/blocked-ips")).await?.json().await?;
        body["blocked_ips"]
            .as_array()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("malformed blocked-ips body"))
    }
}

/// Poll until `check` passes or the deadline expires.
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Raw UTC system time `secs_ago` seconds in the past, with the
/// channel's seven-digit fractional rendering.
pub fn utc_secs_ago(secs: i64) -> String {
    let ts = (chrono::Utc::now() - chrono::Duration::seconds(secs)).naive_utc();
    format!("{}Z", vigil::clock::format_with_precision(ts, 7))
}

/// Host-local civil time `secs_ago` seconds in the past, as the agent
/// would transmit it.
pub fn local_secs_ago(secs: i64) -> String {
    let ts = (chrono::Local::now() - chrono::Duration::seconds(secs)).naive_local();
    vigil::clock::format_with_precision(ts, 7)
}
