//! Liveness loop against a mocked query endpoint.

#[path = "../helpers/mod.rs"]
mod helpers;

use datawatch::settings::SettingsStore;
use datawatch::test_utils::MemorySettingsStore;
use helpers::app::{TestApp, TestAppBuilder};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn answer(server: &MockServer, db: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/v3/query_sql"))
        .and(body_partial_json(json!({ "db": db })))
        .respond_with(response)
        .mount(server)
        .await;
}

fn rows(count: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!([{ "count": count }]))
}

async fn liveness(app: &TestApp) -> Value {
    app.client()
        .get(app.url("/api/liveness"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Polls `/api/liveness` until the active resource equals `expected`.
async fn wait_for_active(app: &TestApp, expected: Value) -> Value {
    let mut report = liveness(app).await;
    for _ in 0..60 {
        if report["activeResource"] == expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        report = liveness(app).await;
    }
    report
}

async fn start(server: &MockServer, settings: Arc<MemorySettingsStore>) -> TestApp {
    TestAppBuilder::new()
        .with_config(|c| {
            c.liveness.enabled = true;
            c.liveness.interval_seconds = 1;
            c.liveness.resources = vec!["A".into(), "B".into(), "C".into()];
        })
        .with_settings(settings)
        .start()
        .await
        .unwrap_or_else(|e| panic!("app failed to start against {}: {e}", server.uri()))
}

#[tokio::test]
async fn test_active_resource_fails_over_in_discovery_order() {
    let server = MockServer::start().await;
    answer(&server, "A", ResponseTemplate::new(500)).await;
    answer(&server, "B", rows(5)).await;
    answer(&server, "C", rows(3)).await;

    let settings = Arc::new(MemorySettingsStore::from_json(json!({
        "endpoint": server.uri(),
        "token": "t",
        "activeBucket": "stale"
    })));
    let app = start(&server, settings.clone()).await;

    let report = wait_for_active(&app, json!("B")).await;
    assert_eq!(report["activeResource"], "B");
    assert_eq!(report["enabled"], true);
    assert_eq!(report["resources"][0], json!({"name": "A", "status": "offline", "hasData": false}));
    assert_eq!(report["resources"][1], json!({"name": "B", "status": "online", "hasData": true}));

    // The reconciled choice is written back for the collector.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(settings.read().await.unwrap().active_resource.as_deref(), Some("B"));

    server.reset().await;
    answer(&server, "A", ResponseTemplate::new(500)).await;
    answer(&server, "B", ResponseTemplate::new(500)).await;
    answer(&server, "C", rows(3)).await;
    let report = wait_for_active(&app, json!("C")).await;
    assert_eq!(report["activeResource"], "C");

    server.reset().await;
    answer(&server, "C", rows(0)).await;
    let report = wait_for_active(&app, Value::Null).await;
    assert_eq!(report["activeResource"], Value::Null);
    assert_eq!(report["resources"][2]["status"], "online");
    assert_eq!(report["resources"][2]["hasData"], false);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!settings.snapshot().contains_key("activeResource"));
    assert_eq!(settings.read().await.unwrap().active_resource, None);

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_unconfigured_connection_keeps_everything_offline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rows(1))
        .expect(0)
        .mount(&server)
        .await;

    let app = start(&server, Arc::new(MemorySettingsStore::default())).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let report = liveness(&app).await;
    assert_eq!(report["activeResource"], Value::Null);
    for resource in report["resources"].as_array().unwrap() {
        assert_eq!(resource["status"], "offline");
    }

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}
