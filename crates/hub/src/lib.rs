// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vigilhub: central collector for failed-login telemetry.
//!
//! Accepts batched events from host agents, persists them idempotently,
//! evaluates rolling-window block policies, and serves the query API and
//! live feed.

pub mod blocks;
pub mod config;
pub mod detect;
pub mod error;
pub mod feed;
pub mod firewall;
pub mod ingest;
pub mod model;
pub mod state;
pub mod storage;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::firewall::LogFirewall;
use crate::state::HubState;
use crate::storage::Store;
use crate::transport::build_router;

/// Run the hub until shutdown.
pub async fn run(config: HubConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let store = Store::connect(&config).await?;
    let state =
        Arc::new(HubState::new(config, store, Arc::new(LogFirewall), shutdown.clone()));

    blocks::spawn_expiry_reconciler(Arc::clone(&state));

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_shutdown.cancel();
        }
    });

    tracing::info!("vigilhub listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
