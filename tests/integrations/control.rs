//! The control HTTP surface driving the supervisor and the settings file.

#[path = "../helpers/mod.rs"]
mod helpers;

use datawatch::test_utils::CountingCycle;
use helpers::app::{TestApp, TestAppBuilder};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

async fn post_monitor(app: &TestApp, body: Value) -> (StatusCode, Value) {
    let response = app
        .client()
        .post(app.url("/api/monitor"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

async fn get_json(app: &TestApp, path: &str) -> Value {
    app.client()
        .get(app.url(path))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_start_stop_restart_lifecycle() {
    let cycle = Arc::new(CountingCycle::new());
    let app = TestAppBuilder::new()
        .with_cycle(cycle.clone())
        .start()
        .await
        .unwrap();

    let status = get_json(&app, "/api/monitor").await;
    assert_eq!(status["monitoring"], false);
    let initial_instance = status["instanceId"].as_i64().unwrap();

    let (code, body) = post_monitor(&app, json!({"action": "start", "intervalSeconds": 60})).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(
        body["message"],
        format!("Directory size monitoring started (instance {initial_instance})")
    );

    let (code, body) = post_monitor(&app, json!({"action": "start"})).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(
        body["message"],
        "invalid action or already in requested state (monitoring: true)"
    );

    let status = get_json(&app, "/api/monitor").await;
    assert_eq!(status["monitoring"], true);
    assert_eq!(status["instanceId"].as_i64().unwrap(), initial_instance);
    assert!(status["message"].as_str().unwrap().contains("is active"));

    let (code, body) = post_monitor(&app, json!({"action": "restart", "intervalSeconds": 60})).await;
    assert_eq!(code, StatusCode::OK);
    let restarted = body["instanceId"].as_i64().unwrap();
    assert!(restarted > initial_instance);

    let (code, _) = post_monitor(&app, json!({"action": "stop"})).await;
    assert_eq!(code, StatusCode::OK);
    let status = get_json(&app, "/api/monitor").await;
    assert_eq!(status["monitoring"], false);
    assert_eq!(status["instanceId"].as_i64().unwrap(), restarted);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cycle.count(), 2, "one immediate collection per start and restart");

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_invalid_requests_do_not_change_state() {
    let app = TestAppBuilder::new()
        .with_cycle(Arc::new(CountingCycle::new()))
        .start()
        .await
        .unwrap();

    let (code, body) = post_monitor(&app, json!({"action": "pause"})).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "invalid action 'pause'");

    let (code, _) = post_monitor(&app, json!({"action": "start", "intervalSeconds": 0})).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    assert_eq!(get_json(&app, "/api/monitor").await["monitoring"], false);

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_config_routes_merge_and_remove_keys() {
    let dir = tempfile::tempdir().unwrap();
    let settings_path = dir.path().join("config.json");
    let app = TestAppBuilder::new()
        .with_config(|c| c.settings.path = settings_path.clone())
        .start()
        .await
        .unwrap();

    assert_eq!(get_json(&app, "/api/config").await, json!({}));

    let body: Value = app
        .client()
        .post(app.url("/api/config"))
        .json(&json!({"endpoint": "http://localhost:8181", "token": "secret"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);

    app.client()
        .post(app.url("/api/config"))
        .json(&json!({"dataPath": "/var/lib/influxdb3"}))
        .send()
        .await
        .unwrap();
    let config = get_json(&app, "/api/config").await;
    assert_eq!(config["endpoint"], "http://localhost:8181");
    assert_eq!(config["dataPath"], "/var/lib/influxdb3");

    let body: Value = app
        .client()
        .delete(app.url("/api/config"))
        .json(&json!({"keys": ["token"]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert!(body["config"].get("token").is_none());

    let on_disk: Value =
        serde_json::from_str(&std::fs::read_to_string(&settings_path).unwrap()).unwrap();
    assert_eq!(on_disk, json!({"endpoint": "http://localhost:8181", "dataPath": "/var/lib/influxdb3"}));

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}
