// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tokio_util::sync::CancellationToken;

use super::Pipeline;
use crate::seen::fingerprint;
use crate::source::replay::ReplaySource;
use crate::test_support::{event_xml, test_settings};

// -- Fake collector -----------------------------------------------------------

#[derive(Clone)]
struct CollectorState {
    batches: Arc<Mutex<Vec<serde_json::Value>>>,
    fail: Arc<AtomicBool>,
}

async fn events_handler(
    State(s): State<CollectorState>,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    if s.fail.load(Ordering::Relaxed) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"success": false, "error": "backend down"})),
        )
            .into_response();
    }
    let accepted = body["events"].as_array().map(Vec::len).unwrap_or(0);
    if let Ok(mut batches) = s.batches.lock() {
        batches.push(body);
    }
    Json(serde_json::json!({"success": true, "accepted": accepted})).into_response()
}

async fn register_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"success": true}))
}

struct FakeCollector {
    url: String,
    batches: Arc<Mutex<Vec<serde_json::Value>>>,
    fail: Arc<AtomicBool>,
}

impl FakeCollector {
    async fn spawn() -> anyhow::Result<Self> {
        let state = CollectorState {
            batches: Arc::new(Mutex::new(Vec::new())),
            fail: Arc::new(AtomicBool::new(false)),
        };
        let batches = Arc::clone(&state.batches);
        let fail = Arc::clone(&state.fail);

        let app = axum::Router::new()
            .route("/api/v1/events", axum::routing::post(events_handler))
            .route("/api/v1/vms", axum::routing::post(register_handler))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self { url, batches, fail })
    }

    fn batch_count(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Every shipped event's source_ip, in delivery order across batches.
    fn shipped_ips(&self) -> Vec<String> {
        let Ok(batches) = self.batches.lock() else {
            return Vec::new();
        };
        batches
            .iter()
            .flat_map(|b| b["events"].as_array().cloned().unwrap_or_default())
            .filter_map(|e| e["source_ip"].as_str().map(str::to_owned))
            .collect()
    }
}

async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let end = tokio::time::Instant::now() + deadline;
    while tokio::time::Instant::now() < end {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

fn utc(i: usize) -> String {
    format!("2026-08-01T10:00:{:02}.000000{}Z", i % 60, i % 10)
}

// -- Back-scan ----------------------------------------------------------------

#[tokio::test]
async fn back_scan_ships_history_oldest_first() -> anyhow::Result<()> {
    let collector = FakeCollector::spawn().await?;
    let tmp = tempfile::tempdir()?;

    let history = vec![
        event_xml("203.0.113.70", "admin", &utc(1), 5001),
        event_xml("203.0.113.71", "admin", &utc(2), 5002),
        event_xml("203.0.113.72", "admin", &utc(3), 5003),
    ];
    let (source, _handle) = ReplaySource::with_history(history);
    let mut pipeline =
        Pipeline::new(test_settings(&collector.url, tmp.path()), source, CancellationToken::new());

    pipeline.back_scan().await;
    assert_eq!(pipeline.pending(), 3);
    pipeline.flush().await;

    assert_eq!(collector.batch_count(), 1);
    assert_eq!(
        collector.shipped_ips(),
        vec!["203.0.113.70", "203.0.113.71", "203.0.113.72"],
        "back-scan output must be chronological"
    );
    // Acknowledged: queue cleared, fingerprints on disk.
    assert_eq!(pipeline.pending(), 0);
    assert!(tmp.path().join("h-test_seen.json").exists());
    Ok(())
}

#[tokio::test]
async fn restart_with_seen_file_re_emits_nothing() -> anyhow::Result<()> {
    let collector = FakeCollector::spawn().await?;
    let tmp = tempfile::tempdir()?;
    let history = vec![
        event_xml("203.0.113.73", "admin", &utc(1), 5001),
        event_xml("203.0.113.74", "admin", &utc(2), 5002),
    ];

    let (source, _handle) = ReplaySource::with_history(history.clone());
    let mut first =
        Pipeline::new(test_settings(&collector.url, tmp.path()), source, CancellationToken::new());
    first.back_scan().await;
    first.flush().await;
    assert_eq!(collector.batch_count(), 1);

    // Same channel contents, fresh process, intact seen file.
    let (source, _handle) = ReplaySource::with_history(history);
    let mut second =
        Pipeline::new(test_settings(&collector.url, tmp.path()), source, CancellationToken::new());
    second.back_scan().await;
    assert_eq!(second.pending(), 0);
    second.flush().await;
    assert_eq!(collector.batch_count(), 1, "restart must not re-ship anything");
    Ok(())
}

#[tokio::test]
async fn back_scan_stops_at_the_first_fully_seen_page() -> anyhow::Result<()> {
    let collector = FakeCollector::spawn().await?;
    let tmp = tempfile::tempdir()?;
    let mut settings = test_settings(&collector.url, tmp.path());
    settings.read_batch = 2;

    // Six events already fingerprinted from a previous run, one new.
    let mut history: Vec<String> = Vec::new();
    {
        let mut seen = crate::seen::SeenSet::load(&settings.seen_path());
        for i in 0..6 {
            let ip = format!("203.0.113.{}", 80 + i);
            history.push(event_xml(&ip, "admin", &utc(i), 5000 + i as u16));
            seen.insert(fingerprint(&utc(i), &ip, "admin", &(5000 + i).to_string()));
        }
        seen.persist()?;
    }
    history.push(event_xml("203.0.113.99", "admin", &utc(7), 5999));

    let (source, handle) = ReplaySource::with_history(history);
    let mut pipeline = Pipeline::new(settings, source, CancellationToken::new());
    pipeline.back_scan().await;

    // Page 1 holds the fresh event; page 2 is fully seen and ends the scan
    // without touching the oldest pages.
    assert_eq!(pipeline.pending(), 1);
    assert_eq!(handle.reverse_read_count(), 2);
    Ok(())
}

// -- Live loop ----------------------------------------------------------------

#[tokio::test]
async fn signaled_events_are_drained_and_shipped() -> anyhow::Result<()> {
    let collector = FakeCollector::spawn().await?;
    let tmp = tempfile::tempdir()?;
    let (source, handle) = ReplaySource::new();
    let shutdown = CancellationToken::new();
    let pipeline =
        Pipeline::new(test_settings(&collector.url, tmp.path()), source, shutdown.clone());
    let task = tokio::spawn(pipeline.run());

    handle.append(event_xml("203.0.113.90", "admin", &utc(1), 6001));

    assert!(
        wait_until(Duration::from_secs(2), || {
            collector.shipped_ips().contains(&"203.0.113.90".to_owned())
        })
        .await
    );

    shutdown.cancel();
    task.await??;
    Ok(())
}

#[tokio::test]
async fn missed_notifications_are_caught_within_one_interval() -> anyhow::Result<()> {
    let collector = FakeCollector::spawn().await?;
    let tmp = tempfile::tempdir()?;
    let (source, handle) = ReplaySource::new();
    let shutdown = CancellationToken::new();
    let pipeline =
        Pipeline::new(test_settings(&collector.url, tmp.path()), source, shutdown.clone());
    let task = tokio::spawn(pipeline.run());

    // The notification mechanism misses this one; only the safety-net
    // forward read can find it.
    handle.append_silently(event_xml("203.0.113.91", "admin", &utc(2), 6002));

    assert!(
        wait_until(Duration::from_secs(2), || {
            collector.shipped_ips().contains(&"203.0.113.91".to_owned())
        })
        .await
    );

    shutdown.cancel();
    task.await??;
    Ok(())
}

#[tokio::test]
async fn loopback_noise_is_never_shipped() -> anyhow::Result<()> {
    let collector = FakeCollector::spawn().await?;
    let tmp = tempfile::tempdir()?;
    let (source, handle) = ReplaySource::new();
    let shutdown = CancellationToken::new();
    let pipeline =
        Pipeline::new(test_settings(&collector.url, tmp.path()), source, shutdown.clone());
    let task = tokio::spawn(pipeline.run());

    for ip in ["127.0.0.1", "::1", "0.0.0.0", "-"] {
        handle.append(event_xml(ip, "admin", &utc(3), 6003));
    }
    handle.append(event_xml("203.0.113.92", "admin", &utc(4), 6004));

    assert!(
        wait_until(Duration::from_secs(2), || {
            collector.shipped_ips().contains(&"203.0.113.92".to_owned())
        })
        .await
    );
    assert_eq!(collector.shipped_ips(), vec!["203.0.113.92"]);

    shutdown.cancel();
    task.await??;
    Ok(())
}

#[tokio::test]
async fn outage_retains_the_queue_until_acknowledged() -> anyhow::Result<()> {
    let collector = FakeCollector::spawn().await?;
    collector.fail.store(true, Ordering::Relaxed);

    let tmp = tempfile::tempdir()?;
    let (source, handle) = ReplaySource::new();
    let shutdown = CancellationToken::new();
    let pipeline =
        Pipeline::new(test_settings(&collector.url, tmp.path()), source, shutdown.clone());
    let task = tokio::spawn(pipeline.run());

    handle.append(event_xml("203.0.113.93", "admin", &utc(5), 6005));
    handle.append(event_xml("203.0.113.94", "admin", &utc(6), 6006));

    // Several poll cycles under outage: nothing recorded.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(collector.batch_count(), 0);

    // Recovery: the retained queue arrives exactly once.
    collector.fail.store(false, Ordering::Relaxed);
    assert!(wait_until(Duration::from_secs(2), || collector.shipped_ips().len() == 2).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(collector.shipped_ips(), vec!["203.0.113.93", "203.0.113.94"]);

    shutdown.cancel();
    task.await??;
    Ok(())
}
