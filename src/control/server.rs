//! # Control Server
//!
//! An `axum` server exposing the out-of-band control surface:
//!
//! - `GET /api/monitor`: collector status.
//! - `POST /api/monitor`: `{action, intervalSeconds?}` with `start`, `stop`,
//!   `restart` or `collect`.
//! - `GET/POST/DELETE /api/config`: read, merge into, or remove keys from
//!   the settings document.
//! - `GET /api/liveness`: the status map and active resource.
//! - `GET /metrics`: Prometheus exposition, when metrics are enabled.
//!
//! The server stops when the shutdown channel fires.

use crate::collector::{CollectorSupervisor, ControlRequest};
use crate::error::ControlError;
use crate::health::{LivenessMonitor, LivenessSnapshot};
use crate::settings::SettingsStore;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, trace, warn};

/// Shared state handed to every route.
#[derive(Clone)]
pub struct ControlState {
    pub supervisor: CollectorSupervisor,
    pub liveness: Option<Arc<LivenessMonitor>>,
    pub settings: Arc<dyn SettingsStore>,
    pub prometheus: Option<PrometheusHandle>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MonitorStatus {
    success: bool,
    monitoring: bool,
    instance_id: i64,
    start_time: DateTime<Utc>,
    message: String,
}

#[derive(Debug, Serialize)]
struct LivenessReport {
    enabled: bool,
    #[serde(flatten)]
    snapshot: LivenessSnapshot,
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "success": false, "message": self.to_string() }));
        (StatusCode::BAD_REQUEST, body).into_response()
    }
}

fn settings_failure(message: &str, e: anyhow::Error) -> Response {
    error!(error = %e, "{message}");
    let body = Json(json!({ "success": false, "error": message }));
    (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
}

fn bad_request(message: &str) -> Response {
    let body = Json(json!({ "success": false, "error": message }));
    (StatusCode::BAD_REQUEST, body).into_response()
}

/// Builds the control router.
pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/api/monitor", get(monitor_status).post(monitor_control))
        .route(
            "/api/config",
            get(config_read).post(config_write).delete(config_remove),
        )
        .route("/api/liveness", get(liveness))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

async fn monitor_status(State(state): State<ControlState>) -> Json<MonitorStatus> {
    let status = state.supervisor.status();
    let message = if status.running {
        format!(
            "Directory size monitoring is active (instance {})",
            status.instance_id
        )
    } else {
        "Directory size monitoring is not active".to_string()
    };
    Json(MonitorStatus {
        success: true,
        monitoring: status.running,
        instance_id: status.instance_id,
        start_time: status.started_at,
        message,
    })
}

async fn monitor_control(
    State(state): State<ControlState>,
    request: Result<Json<ControlRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => {
            let e = ControlError::MalformedRequest(rejection.body_text());
            warn!(error = %e, "Rejected control request");
            return e.into_response();
        }
    };
    info!(action = %request.action, interval_seconds = ?request.interval_seconds, "Control request");
    match state.supervisor.apply(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            warn!(error = %e, "Rejected control request");
            e.into_response()
        }
    }
}

async fn config_read(State(state): State<ControlState>) -> Response {
    match state.settings.load().await {
        Ok(doc) => Json(doc).into_response(),
        Err(e) => settings_failure("Failed to read configuration", e),
    }
}

async fn config_write(State(state): State<ControlState>, Json(patch): Json<Value>) -> Response {
    let Value::Object(patch) = patch else {
        return bad_request("Configuration must be a JSON object");
    };
    match state.settings.write(patch).await {
        Ok(config) => Json(json!({ "success": true, "config": config })).into_response(),
        Err(e) => settings_failure("Failed to update configuration", e),
    }
}

async fn config_remove(State(state): State<ControlState>, Json(body): Json<Value>) -> Response {
    let keys: Option<Vec<String>> = body
        .get("keys")
        .and_then(Value::as_array)
        .map(|keys| keys.iter().filter_map(Value::as_str).map(str::to_string).collect());
    let Some(keys) = keys else {
        return bad_request("Invalid keys provided");
    };
    match state.settings.remove(&keys).await {
        Ok(config) => Json(json!({ "success": true, "config": config })).into_response(),
        Err(e) => settings_failure("Failed to delete configuration keys", e),
    }
}

async fn liveness(State(state): State<ControlState>) -> Json<LivenessReport> {
    let report = match &state.liveness {
        Some(monitor) => LivenessReport {
            enabled: true,
            snapshot: monitor.snapshot(),
        },
        None => LivenessReport {
            enabled: false,
            snapshot: LivenessSnapshot {
                active_resource: None,
                resources: Vec::new(),
            },
        },
    };
    Json(report)
}

async fn render_metrics(State(state): State<ControlState>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics are disabled").into_response(),
    }
}

/// The control server bound to its listener.
pub struct ControlServer {
    listener: TcpListener,
    router: Router,
    shutdown_rx: watch::Receiver<bool>,
}

impl ControlServer {
    /// Binds the listener; port 0 picks a free port.
    pub async fn bind(
        addr: SocketAddr,
        state: ControlState,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(Self, SocketAddr)> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind control server to {addr}"))?;
        let local_addr = listener.local_addr()?;
        Ok((
            Self {
                listener,
                router: router(state),
                shutdown_rx,
            },
            local_addr,
        ))
    }

    /// Returns a future that serves requests until shutdown.
    pub fn run(mut self) -> impl Future<Output = ()> {
        async move {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => {
                    trace!("Control server received shutdown signal.");
                }
                result = axum::serve(self.listener, self.router.into_make_service()) => {
                    if let Err(e) = result {
                        error!(error = %e, "Control server error");
                    }
                }
            }
            trace!("Control server task finished.");
        }
    }
}
