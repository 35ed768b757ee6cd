// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the hub API.

pub mod feed;
pub mod http;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::HubState;

/// Upper bound on request handling, ingestion included.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Build the axum `Router` with the full API surface nested under the
/// configured base path (default `/api/v1`).
pub fn build_router(state: Arc<HubState>) -> Router {
    let api = Router::new()
        // Queries
        .route("/suspicious-ips", get(http::suspicious_ips))
        .route("/statistics", get(http::statistics))
        .route("/statistics/global", get(http::global_statistics))
        .route("/blocked-ips", get(http::blocked_ips))
        .route("/geo-attacks", get(http::geo_attacks))
        .route("/health", get(http::health))
        // Blocks
        .route("/block", post(http::create_block))
        .route("/block/per-vm", post(http::create_host_block))
        .route("/block/{ip}", delete(http::unblock))
        // Host registry
        .route("/vms", post(http::register_host).get(http::list_hosts))
        .route("/vms/{id}", delete(http::deregister_host))
        .route("/vms/{id}/attacks", get(http::host_attacks))
        // Ingestion
        .route("/events", post(http::ingest_events))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        // Added after the timeout layer: the feed stream must outlive
        // the request budget.
        .route("/feed", get(feed::feed));

    let base = state.config.base_path.clone();
    Router::new()
        .nest(&base, api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
