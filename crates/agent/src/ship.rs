// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the collector's ingest API.

use reqwest::Client;
use serde::{Deserialize, Serialize};

/// One normalized event ready for transmission. `event_timestamp` is the
/// host-local civil rendering; the raw UTC string never leaves the agent.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutEvent {
    pub source_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_host_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logon_type: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_port: Option<i64>,
    pub event_timestamp: String,
    pub event_class: i64,
}

#[derive(Debug, Serialize)]
struct EventBatch<'a> {
    host_id: &'a str,
    host_name: &'a str,
    events: &'a [OutEvent],
}

#[derive(Debug, Deserialize)]
struct IngestReply {
    #[serde(default)]
    accepted: i64,
}

#[derive(Debug, Serialize)]
struct RegisterBody<'a> {
    vm_id: &'a str,
    host_name: &'a str,
    collection_method: &'a str,
}

/// Client for one collector instance.
pub struct CollectorClient {
    base_url: String,
    client: Client,
}

impl CollectorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { base_url: base_url.into(), client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// Ship one batch. Any non-2xx response or transport error leaves the
    /// caller's queue intact for the next cycle.
    pub async fn post_events(
        &self,
        host_id: &str,
        host_name: &str,
        events: &[OutEvent],
    ) -> anyhow::Result<i64> {
        let body = EventBatch { host_id, host_name, events };
        let resp = self.client.post(self.url("/events")).json(&body).send().await?;
        let reply: IngestReply = resp.error_for_status()?.json().await?;
        Ok(reply.accepted)
    }

    /// Best-effort host registration at startup.
    pub async fn register_host(&self, host_id: &str, host_name: &str) -> anyhow::Result<()> {
        let body = RegisterBody { vm_id: host_id, host_name, collection_method: "agent" };
        let resp = self.client.post(self.url("/vms")).json(&body).send().await?;
        resp.error_for_status()?;
        Ok(())
    }
}
