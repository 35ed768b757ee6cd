// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the hub API.
//!
//! Every success body carries `success: true`; failures are `HubError`
//! rendered as `{"success": false, "error": "..."}`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::blocks;
use crate::error::HubError;
use crate::ingest::{self, IngestBatch};
use crate::model::{settings, Block, BlockScope, Host, SuspiciousIp};
use crate::state::HubState;
use crate::storage::{now_local, HostAttacks, HostBreakdown, Statistics};

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SuspiciousQuery {
    #[serde(default = "default_suspicious_threshold")]
    pub threshold: i64,
}

fn default_suspicious_threshold() -> i64 {
    5
}

#[derive(Debug, Serialize)]
pub struct SuspiciousResponse {
    pub success: bool,
    pub count: usize,
    pub suspicious_ips: Vec<SuspiciousIp>,
}

#[derive(Debug, Serialize)]
pub struct StatisticsResponse {
    pub success: bool,
    pub statistics: Statistics,
}

#[derive(Debug, Serialize)]
pub struct GlobalStatisticsResponse {
    pub success: bool,
    pub statistics: Statistics,
    pub hosts: Vec<HostBreakdown>,
    pub active_hosts: i64,
    pub inactive_hosts: i64,
}

/// Projection of an active block for `GET /blocked-ips`.
#[derive(Debug, Serialize)]
pub struct BlockedView {
    pub source_ip: String,
    pub blocked_at: chrono::NaiveDateTime,
    pub block_expires: chrono::NaiveDateTime,
    pub reason: String,
    pub auto_blocked: bool,
    pub scope: BlockScope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_host_id: Option<String>,
}

impl From<Block> for BlockedView {
    fn from(b: Block) -> Self {
        Self {
            source_ip: b.source_ip,
            blocked_at: b.created_at,
            block_expires: b.expires_at,
            reason: b.reason,
            auto_blocked: b.created_by == "auto",
            scope: b.scope,
            target_host_id: b.target_host_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BlockedResponse {
    pub success: bool,
    pub blocked_ips: Vec<BlockedView>,
}

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub ip_address: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HostBlockRequest {
    pub ip_address: String,
    pub vm_id: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BlockResponse {
    pub success: bool,
    pub source_ip: String,
    pub expires_at: chrono::NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct UnblockResponse {
    pub success: bool,
    pub cleared: usize,
}

#[derive(Debug, Deserialize)]
pub struct RegisterHostRequest {
    pub vm_id: String,
    #[serde(default)]
    pub host_name: Option<String>,
    #[serde(default)]
    pub host_ip: Option<String>,
    #[serde(default)]
    pub collection_method: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterHostResponse {
    pub success: bool,
    pub vm_id: String,
}

#[derive(Debug, Serialize)]
pub struct HostListResponse {
    pub success: bool,
    pub vms: Vec<Host>,
}

#[derive(Debug, Serialize)]
pub struct DeregisterResponse {
    pub success: bool,
    pub vm_id: String,
}

#[derive(Debug, Serialize)]
pub struct HostAttacksResponse {
    pub success: bool,
    pub attacks: HostAttacks,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub accepted: i64,
}

#[derive(Debug, Serialize)]
pub struct GeoAttacksResponse {
    pub success: bool,
    pub geo_attacks: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: String,
    pub uptime_seconds: u64,
    pub active_hosts: i64,
    pub db_connected: bool,
}

// -- Helpers ------------------------------------------------------------------

/// Unwrap a JSON body, mapping extractor rejections to 400 rather than
/// axum's default 422.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, HubError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| HubError::Validation(format!("malformed body: {e}")))
}

/// Reject anything that is not an IPv4 dotted-quad or IPv6 literal.
fn require_ip(raw: &str) -> Result<String, HubError> {
    let trimmed = raw.trim();
    trimmed
        .parse::<std::net::IpAddr>()
        .map(|_| trimmed.to_owned())
        .map_err(|_| HubError::Validation(format!("invalid ip address: {raw}")))
}

// -- Query handlers -----------------------------------------------------------

/// `GET /suspicious-ips?threshold=N`
pub async fn suspicious_ips(
    State(s): State<Arc<HubState>>,
    Query(q): Query<SuspiciousQuery>,
) -> Result<Json<SuspiciousResponse>, HubError> {
    let suspicious_ips = s.store.suspicious(q.threshold).await?;
    Ok(Json(SuspiciousResponse { success: true, count: suspicious_ips.len(), suspicious_ips }))
}

/// `GET /statistics`
pub async fn statistics(
    State(s): State<Arc<HubState>>,
) -> Result<Json<StatisticsResponse>, HubError> {
    let statistics = s.store.statistics(now_local()).await?;
    Ok(Json(StatisticsResponse { success: true, statistics }))
}

/// `GET /statistics/global`
pub async fn global_statistics(
    State(s): State<Arc<HubState>>,
) -> Result<Json<GlobalStatisticsResponse>, HubError> {
    let now = now_local();
    let statistics = s.store.statistics(now).await?;
    let hosts = s.store.host_breakdown(now).await?;
    let (active_hosts, inactive_hosts) = s.store.host_counts().await?;
    Ok(Json(GlobalStatisticsResponse {
        success: true,
        statistics,
        hosts,
        active_hosts,
        inactive_hosts,
    }))
}

/// `GET /blocked-ips`
pub async fn blocked_ips(
    State(s): State<Arc<HubState>>,
) -> Result<Json<BlockedResponse>, HubError> {
    let blocked = s.store.active_blocks().await?;
    Ok(Json(BlockedResponse {
        success: true,
        blocked_ips: blocked.into_iter().map(BlockedView::from).collect(),
    }))
}

/// `GET /geo-attacks` — geolocation enrichment lives outside this service;
/// the projection is an empty stub.
pub async fn geo_attacks(State(_s): State<Arc<HubState>>) -> Json<GeoAttacksResponse> {
    Json(GeoAttacksResponse { success: true, geo_attacks: Vec::new() })
}

/// `GET /health`
pub async fn health(State(s): State<Arc<HubState>>) -> Result<Json<HealthResponse>, HubError> {
    let db_connected = s.store.ping().await;
    let active_hosts = if db_connected { s.store.host_counts().await?.0 } else { 0 };
    Ok(Json(HealthResponse {
        success: true,
        status: "running".to_owned(),
        uptime_seconds: s.uptime_seconds(),
        active_hosts,
        db_connected,
    }))
}

// -- Block handlers -----------------------------------------------------------

/// `POST /block` — manual global block.
pub async fn create_block(
    State(s): State<Arc<HubState>>,
    payload: Result<Json<BlockRequest>, JsonRejection>,
) -> Result<Json<BlockResponse>, HubError> {
    let req = body(payload)?;
    let ip = require_ip(&req.ip_address)?;
    let duration = manual_duration(&s, req.duration_minutes).await?;
    let reason = req.reason.unwrap_or_else(|| "manual block".to_owned());

    let block =
        blocks::create_block(&s, &ip, BlockScope::Global, None, &reason, duration, "manual")
            .await?;
    Ok(Json(BlockResponse { success: true, source_ip: ip, expires_at: block.expires_at }))
}

/// `POST /block/per-vm` — manual per-host block.
pub async fn create_host_block(
    State(s): State<Arc<HubState>>,
    payload: Result<Json<HostBlockRequest>, JsonRejection>,
) -> Result<Json<BlockResponse>, HubError> {
    let req = body(payload)?;
    let ip = require_ip(&req.ip_address)?;
    if !s.store.host_exists(&req.vm_id).await? {
        return Err(HubError::NotFound(format!("unknown host: {}", req.vm_id)));
    }
    let duration = manual_duration(&s, req.duration_minutes).await?;
    let reason = req.reason.unwrap_or_else(|| "manual block".to_owned());

    let block = blocks::create_block(
        &s,
        &ip,
        BlockScope::PerHost,
        Some(&req.vm_id),
        &reason,
        duration,
        "manual",
    )
    .await?;
    Ok(Json(BlockResponse { success: true, source_ip: ip, expires_at: block.expires_at }))
}

/// `DELETE /block/{ip}`
pub async fn unblock(
    State(s): State<Arc<HubState>>,
    Path(ip): Path<String>,
) -> Result<Json<UnblockResponse>, HubError> {
    let ip = require_ip(&ip)?;
    let cleared = blocks::unblock(&s, &ip, "manual").await?;
    Ok(Json(UnblockResponse { success: true, cleared: cleared.len() }))
}

async fn manual_duration(
    s: &HubState,
    duration_minutes: Option<i64>,
) -> Result<chrono::Duration, HubError> {
    let minutes = match duration_minutes {
        Some(m) if m > 0 => m,
        Some(_) => return Err(HubError::Validation("duration_minutes must be positive".into())),
        None => {
            s.store.setting_i64(settings::BLOCK_DURATION, s.config.block_duration).await?.max(1)
        }
    };
    Ok(chrono::Duration::minutes(minutes))
}

// -- Host registry handlers ---------------------------------------------------

/// `POST /vms`
pub async fn register_host(
    State(s): State<Arc<HubState>>,
    payload: Result<Json<RegisterHostRequest>, JsonRejection>,
) -> Result<Json<RegisterHostResponse>, HubError> {
    let req = body(payload)?;
    if req.vm_id.trim().is_empty() {
        return Err(HubError::Validation("vm_id is required".into()));
    }
    let host_ip = match req.host_ip.as_deref().filter(|ip| !ip.is_empty()) {
        Some(ip) => Some(require_ip(ip)?),
        None => None,
    };
    let method = match req.collection_method.as_deref() {
        None | Some("agent") => "agent",
        Some("forwarded") => "forwarded",
        Some(other) => {
            return Err(HubError::Validation(format!("unknown collection method: {other}")))
        }
    };

    s.store
        .register_host(req.vm_id.trim(), req.host_name.as_deref(), host_ip.as_deref(), method)
        .await?;
    tracing::info!(host = %req.vm_id, method, "host registered");
    Ok(Json(RegisterHostResponse { success: true, vm_id: req.vm_id.trim().to_owned() }))
}

/// `GET /vms`
pub async fn list_hosts(
    State(s): State<Arc<HubState>>,
) -> Result<Json<HostListResponse>, HubError> {
    let vms = s.store.list_hosts().await?;
    Ok(Json(HostListResponse { success: true, vms }))
}

/// `DELETE /vms/{id}`
pub async fn deregister_host(
    State(s): State<Arc<HubState>>,
    Path(id): Path<String>,
) -> Result<Json<DeregisterResponse>, HubError> {
    if !s.store.delete_host(&id).await? {
        return Err(HubError::NotFound(format!("unknown host: {id}")));
    }
    tracing::info!(host = %id, "host deregistered");
    Ok(Json(DeregisterResponse { success: true, vm_id: id }))
}

/// `GET /vms/{id}/attacks`
pub async fn host_attacks(
    State(s): State<Arc<HubState>>,
    Path(id): Path<String>,
) -> Result<Json<HostAttacksResponse>, HubError> {
    if !s.store.host_exists(&id).await? {
        return Err(HubError::NotFound(format!("unknown host: {id}")));
    }
    let attacks = s.store.host_attacks(&id, now_local()).await?;
    Ok(Json(HostAttacksResponse { success: true, attacks }))
}

// -- Ingestion ----------------------------------------------------------------

/// `POST /events`
pub async fn ingest_events(
    State(s): State<Arc<HubState>>,
    payload: Result<Json<IngestBatch>, JsonRejection>,
) -> Result<Json<IngestResponse>, HubError> {
    let batch = body(payload)?;
    let accepted = ingest::ingest_batch(&s, batch).await?;
    Ok(Json(IngestResponse { success: true, accepted }))
}
