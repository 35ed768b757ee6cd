// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vigil: host agent for failed-login telemetry.
//!
//! Watches the local security channel for authentication failures,
//! deduplicates and normalizes them, and ships batches to the collector.

pub mod clock;
pub mod config;
pub mod parse;
pub mod pipeline;
pub mod queue;
pub mod seen;
pub mod ship;
pub mod source;
pub mod test_support;

use tokio_util::sync::CancellationToken;

use crate::config::AgentSettings;
use crate::pipeline::Pipeline;
use crate::ship::CollectorClient;
use crate::source::wevtutil::WevtutilSource;

/// Run the agent until shutdown.
pub async fn run(settings: AgentSettings) -> anyhow::Result<()> {
    // Best-effort registration; first shipped event registers us anyway.
    let client = CollectorClient::new(settings.collector_url.clone());
    if let Err(e) = client.register_host(&settings.host_id, &settings.host_name).await {
        tracing::warn!(err = %e, "host registration failed, continuing");
    }

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("termination signal received");
            signal_shutdown.cancel();
        }
    });

    let source = WevtutilSource::new(settings.event_id);
    tracing::info!(host = %settings.host_id, collector = %settings.collector_url, "vigil agent starting");
    Pipeline::new(settings, source, shutdown).run().await
}
