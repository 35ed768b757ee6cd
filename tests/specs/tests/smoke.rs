// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenario tests: a real hub served over TCP, driven by the
//! real agent pipeline and plain HTTP clients.

use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use vigil::pipeline::Pipeline;
use vigil::source::replay::ReplaySource;
use vigil::test_support::{event_xml, test_settings};
use vigil_specs::{local_secs_ago, spawn_hub, utc_secs_ago, wait_until};

const TIMEOUT: Duration = Duration::from_secs(5);

// -- S1: threshold triggers a global block ------------------------------------

#[tokio::test]
async fn s1_threshold_triggers_global_block() -> anyhow::Result<()> {
    let hub = spawn_hub().await?;
    let client = reqwest::Client::new();

    // Five failures from one IP, spaced 30 s apart, ending now.
    let events: Vec<serde_json::Value> = (0..5)
        .map(|i| {
            serde_json::json!({
                "source_ip": "203.0.113.10",
                "target_username": "administrator",
                "source_port": 50000 + i,
                "event_timestamp": local_secs_ago(30 * (4 - i)),
            })
        })
        .collect();
    let resp = client
        .post(hub.api("/events"))
        .json(&serde_json::json!({ "host_id": "h-1", "events": events }))
        .send()
        .await?;
    assert!(resp.status().is_success());

    let blocked = hub.blocked_ips().await?;
    assert_eq!(blocked.len(), 1, "exactly one block expected");
    assert_eq!(blocked[0]["source_ip"], "203.0.113.10");
    assert_eq!(blocked[0]["scope"], "global");
    assert_eq!(blocked[0]["auto_blocked"], true);

    // expires_at = created_at + BLOCK_DURATION (60 min), within a second.
    let blocked_at =
        chrono::NaiveDateTime::parse_from_str(blocked[0]["blocked_at"].as_str().unwrap_or(""), "%Y-%m-%dT%H:%M:%S%.f")?;
    let expires =
        chrono::NaiveDateTime::parse_from_str(blocked[0]["block_expires"].as_str().unwrap_or(""), "%Y-%m-%dT%H:%M:%S%.f")?;
    let lifetime = expires - blocked_at;
    assert!((lifetime - chrono::Duration::minutes(60)).num_seconds().abs() <= 1);

    assert_eq!(hub.firewall.apply_count(), 1);
    Ok(())
}

// -- S2: duplicate batch is idempotent ----------------------------------------

#[tokio::test]
async fn s2_duplicate_batch_is_idempotent() -> anyhow::Result<()> {
    let hub = spawn_hub().await?;
    let client = reqwest::Client::new();

    let batch = serde_json::json!({
        "host_id": "h-1",
        "events": [
            { "source_ip": "198.51.100.20", "target_username": "admin", "source_port": 1, "event_timestamp": local_secs_ago(3) },
            { "source_ip": "198.51.100.20", "target_username": "admin", "source_port": 2, "event_timestamp": local_secs_ago(2) },
            { "source_ip": "198.51.100.20", "target_username": "root", "source_port": 3, "event_timestamp": local_secs_ago(1) },
        ],
    });

    let body: serde_json::Value =
        client.post(hub.api("/events")).json(&batch).send().await?.json().await?;
    assert_eq!(body["accepted"], 3);
    assert_eq!(hub.total_attempts().await?, 3);

    let suspicious: serde_json::Value =
        reqwest::get(hub.api("/suspicious-ips?threshold=1")).await?.json().await?;
    assert_eq!(suspicious["suspicious_ips"][0]["lifetime_failure_count"], 3);

    let body: serde_json::Value =
        client.post(hub.api("/events")).json(&batch).send().await?.json().await?;
    assert_eq!(body["accepted"], 0);
    assert_eq!(hub.total_attempts().await?, 3);

    let suspicious: serde_json::Value =
        reqwest::get(hub.api("/suspicious-ips?threshold=1")).await?.json().await?;
    assert_eq!(suspicious["suspicious_ips"][0]["lifetime_failure_count"], 3);
    Ok(())
}

// -- S3: per-host block suppressed by an active global block ------------------

#[tokio::test]
async fn s3_per_host_block_suppressed_by_global() -> anyhow::Result<()> {
    let hub = spawn_hub().await?;
    let client = reqwest::Client::new();

    let resp = client
        .post(hub.api("/block"))
        .json(&serde_json::json!({ "ip_address": "203.0.113.11", "reason": "containment" }))
        .send()
        .await?;
    assert!(resp.status().is_success());

    // Enough traffic on h-2 to cross the per-host threshold.
    let events: Vec<serde_json::Value> = (0..5)
        .map(|i| {
            serde_json::json!({
                "source_ip": "203.0.113.11",
                "target_username": "administrator",
                "source_port": 51000 + i,
                "event_timestamp": local_secs_ago(5 - i),
            })
        })
        .collect();
    client
        .post(hub.api("/events"))
        .json(&serde_json::json!({ "host_id": "h-2", "events": events }))
        .send()
        .await?;

    let blocked = hub.blocked_ips().await?;
    assert_eq!(blocked.len(), 1, "the global block already covers h-2");
    assert_eq!(blocked[0]["scope"], "global");
    Ok(())
}

// -- S4: unblock removes the firewall rule ------------------------------------

#[tokio::test]
async fn s4_unblock_removes_firewall_rule() -> anyhow::Result<()> {
    let hub = spawn_hub().await?;
    let client = reqwest::Client::new();

    client
        .post(hub.api("/block"))
        .json(&serde_json::json!({ "ip_address": "203.0.113.12" }))
        .send()
        .await?;
    assert_eq!(hub.blocked_ips().await?.len(), 1);

    let resp = client.delete(hub.api("/block/203.0.113.12")).send().await?;
    assert_eq!(resp.status().as_u16(), 200);
    assert!(hub.blocked_ips().await?.is_empty());
    assert_eq!(hub.firewall.remove_count(), 1);

    let resp = client.delete(hub.api("/block/203.0.113.12")).send().await?;
    assert_eq!(resp.status().as_u16(), 404);
    Ok(())
}

// -- S5: agent restart without backend ----------------------------------------

#[tokio::test]
async fn s5_agent_restart_recovers_without_duplicates() -> anyhow::Result<()> {
    let hub = spawn_hub().await?;
    let state_dir = tempfile::tempdir()?;

    let history = vec![
        event_xml("203.0.113.40", "admin", &utc_secs_ago(30), 7001),
        event_xml("203.0.113.41", "admin", &utc_secs_ago(20), 7002),
        event_xml("203.0.113.42", "admin", &utc_secs_ago(10), 7003),
    ];

    // First life: the collector is unreachable, so nothing is acknowledged
    // and no seen file is written. The process dies ungracefully.
    {
        let (source, _handle) = ReplaySource::with_history(history.clone());
        let shutdown = CancellationToken::new();
        let settings = test_settings("http://127.0.0.1:9", state_dir.path());
        let task = tokio::spawn(Pipeline::new(settings, source, shutdown.clone()).run());
        tokio::time::sleep(Duration::from_millis(150)).await;
        task.abort();
        let _ = task.await;
    }
    assert!(!state_dir.path().join("h-test_seen.json").exists());
    assert_eq!(hub.total_attempts().await?, 0);

    // Second life: backend is reachable. The back-scan rediscovers the
    // history and ships it exactly once.
    {
        let (source, _handle) = ReplaySource::with_history(history.clone());
        let shutdown = CancellationToken::new();
        let settings = test_settings(&hub.url, state_dir.path());
        let task = tokio::spawn(Pipeline::new(settings, source, shutdown.clone()).run());

        let ok = {
            let hub = &hub;
            wait_until_async(TIMEOUT, || async { hub.total_attempts().await.unwrap_or(0) == 3 })
                .await
        };
        assert!(ok, "history should arrive after recovery");

        shutdown.cancel();
        task.await??;
    }
    assert!(state_dir.path().join("h-test_seen.json").exists());

    // Third life: the seen file is lost. The back-scan re-emits everything
    // and the collector's natural-key dedup absorbs the replay.
    {
        let fresh_dir = tempfile::tempdir()?;
        let (source, _handle) = ReplaySource::with_history(history);
        let shutdown = CancellationToken::new();
        let settings = test_settings(&hub.url, fresh_dir.path());
        let task = tokio::spawn(Pipeline::new(settings, source, shutdown.clone()).run());
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
        task.await??;
    }
    assert_eq!(hub.total_attempts().await?, 3, "replays must not double-count");
    Ok(())
}

/// Async-predicate variant of [`wait_until`].
async fn wait_until_async<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check().await
}

// -- S6: SSE fan-out ----------------------------------------------------------

/// Read one SSE frame (event + data lines) from a streaming response.
async fn next_frame(resp: reqwest::Response) -> anyhow::Result<String> {
    let mut stream = resp.bytes_stream();
    let mut buffer = String::new();
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .ok_or_else(|| anyhow::anyhow!("timed out waiting for SSE frame"))?;
        let chunk = tokio::time::timeout(remaining, stream.next())
            .await?
            .transpose()?
            .ok_or_else(|| anyhow::anyhow!("feed closed before a frame arrived"))?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));
        if let Some(frame) = buffer.split("\n\n").find(|f| f.contains("event: new_attack")) {
            return Ok(frame.to_owned());
        }
    }
}

#[tokio::test]
async fn s6_sse_fan_out_reaches_attached_clients_only() -> anyhow::Result<()> {
    let hub = spawn_hub().await?;
    let client = reqwest::Client::new();

    // Two clients attach before the event.
    let feed_a = client.get(hub.api("/feed")).send().await?;
    let feed_b = client.get(hub.api("/feed")).send().await?;
    assert!(wait_until(TIMEOUT, || hub.state.feed.subscriber_count() >= 2).await);

    client
        .post(hub.api("/events"))
        .json(&serde_json::json!({
            "host_id": "h-1",
            "events": [{
                "source_ip": "203.0.113.50",
                "target_username": "administrator",
                "source_port": 50234,
                "event_timestamp": local_secs_ago(0),
            }],
        }))
        .send()
        .await?;

    for feed in [feed_a, feed_b] {
        let frame = next_frame(feed).await?;
        assert!(frame.contains("event: new_attack"));
        let data = frame
            .lines()
            .find_map(|l| l.strip_prefix("data: "))
            .ok_or_else(|| anyhow::anyhow!("frame without data line"))?;
        let json: serde_json::Value = serde_json::from_str(data)?;
        assert_eq!(json["source_ip"], "203.0.113.50");
        assert_eq!(json["attempt_number"], 1);
    }

    // A client attaching after the ingest sees nothing from that event.
    let mut late = hub.state.feed.subscribe();
    assert!(late.try_recv().is_err());
    Ok(())
}

// -- Agent against hub: the full pipeline -------------------------------------

#[tokio::test]
async fn agent_driven_brute_force_ends_in_a_block() -> anyhow::Result<()> {
    let hub = spawn_hub().await?;
    let state_dir = tempfile::tempdir()?;
    let (source, handle) = ReplaySource::new();
    let shutdown = CancellationToken::new();
    let settings = test_settings(&hub.url, state_dir.path());
    let task = tokio::spawn(Pipeline::new(settings, source, shutdown.clone()).run());

    // A live brute-force burst against this host.
    for i in 0..5u16 {
        handle.append(event_xml(
            "203.0.113.60",
            "administrator",
            &utc_secs_ago(5 - i64::from(i)),
            52000 + i,
        ));
    }

    let ok = {
        let hub = &hub;
        wait_until_async(TIMEOUT, || async {
            hub.blocked_ips().await.map(|b| b.len() == 1).unwrap_or(false)
        })
        .await
    };
    assert!(ok, "threshold crossing should end in a block");

    let blocked = hub.blocked_ips().await?;
    assert_eq!(blocked[0]["source_ip"], "203.0.113.60");
    assert_eq!(blocked[0]["scope"], "global");
    assert_eq!(hub.firewall.apply_count(), 1);

    // The host registry saw the agent's events.
    let vms: serde_json::Value = reqwest::get(hub.api("/vms")).await?.json().await?;
    assert_eq!(vms["vms"][0]["host_id"], "h-test");

    shutdown.cancel();
    task.await??;
    Ok(())
}

// -- Ordering within one batch ------------------------------------------------

#[tokio::test]
async fn batch_order_is_preserved_through_the_feed() -> anyhow::Result<()> {
    let hub = spawn_hub().await?;
    let client = reqwest::Client::new();
    let mut rx = hub.state.feed.subscribe();

    let events: Vec<serde_json::Value> = (0..4)
        .map(|i| {
            serde_json::json!({
                "source_ip": format!("198.51.100.{}", 30 + i),
                "target_username": "admin",
                "source_port": 40000 + i,
                "event_timestamp": local_secs_ago(4 - i),
            })
        })
        .collect();
    client
        .post(hub.api("/events"))
        .json(&serde_json::json!({ "host_id": "h-1", "events": events }))
        .send()
        .await?;

    for i in 0..4 {
        let frame = rx.recv().await?;
        assert_eq!(frame.source_ip, format!("198.51.100.{}", 30 + i));
    }
    Ok(())
}
