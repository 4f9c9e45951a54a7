//! End-to-end collection: settings file, on-disk layout, real writer, mocked sink.

#[path = "../helpers/mod.rs"]
mod helpers;

use datawatch::collector::TimerRegistry;
use datawatch::test_utils::CountingCycle;
use helpers::app::TestAppBuilder;
use helpers::write_file;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates `<base>/flightsim/{dbs,c}` with two numbered generations.
fn storage() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("flightsim/dbs/flightsim-3/wal"), 500);
    write_file(&dir.path().join("flightsim/dbs/flightsim-10/wal"), 60);
    write_file(&dir.path().join("flightsim/dbs/flightsim-10/nested/snap"), 40);
    write_file(&dir.path().join("flightsim/c/segment"), 50);
    dir
}

fn write_settings(dir: &TempDir, settings: Value) -> std::path::PathBuf {
    let path = dir.path().join("config.json");
    std::fs::write(&path, settings.to_string()).unwrap();
    path
}

async fn wait_for_requests(server: &MockServer, count: usize) -> usize {
    for _ in 0..50 {
        let received = server.received_requests().await.unwrap_or_default().len();
        if received >= count {
            return received;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn test_collect_action_writes_latest_generation_and_archive() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/write_lp"))
        .and(query_param("db", "flightsim"))
        .and(query_param("precision", "nanosecond"))
        .and(header("authorization", "Bearer apiv3_secret"))
        .and(body_string_contains("directory_stats,folder=db_size directory_size_bytes=100 "))
        .and(body_string_contains("directory_stats,folder=compacted_size directory_size_bytes=50 "))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let data = storage();
    let settings_dir = tempfile::tempdir().unwrap();
    let settings_path = write_settings(
        &settings_dir,
        json!({
            "endpoint": server.uri(),
            "token": "apiv3_secret",
            "dataPath": data.path()
        }),
    );

    let app = TestAppBuilder::new()
        .with_config(|c| c.settings.path = settings_path)
        .start()
        .await
        .unwrap();

    let response: Value = app
        .client()
        .post(app.url("/api/monitor"))
        .json(&json!({"action": "collect"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["success"], true);
    assert_eq!(response["outcome"]["outcome"], "written");
    assert_eq!(response["monitoring"], false, "collect must not start the timer");

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_missing_token_makes_no_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let data = storage();
    let settings_dir = tempfile::tempdir().unwrap();
    let settings_path = write_settings(
        &settings_dir,
        json!({"endpoint": server.uri(), "dataPath": data.path()}),
    );

    let app = TestAppBuilder::new()
        .with_config(|c| c.settings.path = settings_path)
        .start()
        .await
        .unwrap();

    let response: Value = app
        .client()
        .post(app.url("/api/monitor"))
        .json(&json!({"action": "collect"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["success"], true);
    assert_eq!(response["outcome"]["outcome"], "skipped");

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_autostart_collects_immediately_and_targets_active_resource() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/write_lp"))
        .and(query_param("db", "telemetry"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let data = tempfile::tempdir().unwrap();
    write_file(&data.path().join("dbs/telemetry-1/file"), 10);
    let settings_dir = tempfile::tempdir().unwrap();
    let settings_path = write_settings(
        &settings_dir,
        json!({
            "influxEndpoint": server.uri(),
            "adminToken": "legacy",
            "dataPath": data.path(),
            "activeBucket": "telemetry"
        }),
    );

    let app = TestAppBuilder::new()
        .with_config(|c| {
            c.settings.path = settings_path;
            c.collector.autostart = true;
            c.collector.interval_seconds = 3600;
        })
        .start()
        .await
        .unwrap();

    assert_eq!(wait_for_requests(&server, 1).await, 1);
    assert!(app.supervisor.status().running);

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_rebuild_with_shared_registry_cancels_previous_timer() {
    let registry = TimerRegistry::new();
    let first_cycle = Arc::new(CountingCycle::new());
    let second_cycle = Arc::new(CountingCycle::new());

    let first = TestAppBuilder::new()
        .with_config(|c| {
            c.collector.autostart = true;
            c.collector.interval_seconds = 1;
        })
        .with_registry(registry.clone())
        .with_cycle(first_cycle.clone())
        .start()
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(first_cycle.count(), 1);

    // A reload builds a new app before the old one has been torn down.
    let second = TestAppBuilder::new()
        .with_config(|c| {
            c.collector.autostart = true;
            c.collector.interval_seconds = 1;
        })
        .with_registry(registry.clone())
        .with_cycle(second_cycle.clone())
        .start()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(first_cycle.count(), 1, "the previous generation's timer must be cancelled");
    assert_eq!(second_cycle.count(), 2);
    assert!(registry.is_armed());

    first.shutdown(Duration::from_secs(5)).await.unwrap();
    assert!(registry.is_armed(), "stopping a stale generation leaves the new timer alone");
    second.shutdown(Duration::from_secs(5)).await.unwrap();
    assert!(!registry.is_armed());
}
