//! The periodic liveness reconciliation loop.
//!
//! Each tick probes every known resource (probes may overlap up to the
//! configured concurrency), records the results in the [`StatusMap`] and
//! re-runs [`select_active`] after every result. Changes to the active
//! resource are published on a `watch` channel; unchanged selections do
//! not notify.

use super::status::{select_active, StatusMap};
use crate::core::{HealthProbe, HealthStatus, ResourceHealth};
use crate::settings::SettingsStore;
use crate::task_manager::TaskManager;
use crate::utils::sync::lock;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What `GET /api/liveness` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessSnapshot {
    pub active_resource: Option<String>,
    pub resources: Vec<ResourceHealth>,
}

pub struct LivenessMonitor {
    settings: Arc<dyn SettingsStore>,
    probe: Arc<dyn HealthProbe>,
    status: Mutex<StatusMap>,
    active_tx: watch::Sender<Option<String>>,
    concurrency: usize,
}

impl LivenessMonitor {
    pub fn new<S: AsRef<str>>(
        settings: Arc<dyn SettingsStore>,
        probe: Arc<dyn HealthProbe>,
        resources: &[S],
        concurrency: usize,
    ) -> Arc<Self> {
        let (active_tx, _) = watch::channel(None);
        Arc::new(Self {
            settings,
            probe,
            status: Mutex::new(StatusMap::with_resources(resources)),
            active_tx,
            concurrency: concurrency.max(1),
        })
    }

    /// Receives every change of the active resource.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.active_tx.subscribe()
    }

    pub fn active(&self) -> Option<String> {
        self.active_tx.borrow().clone()
    }

    pub fn snapshot(&self) -> LivenessSnapshot {
        let resources = lock(&self.status).entries().to_vec();
        LivenessSnapshot {
            active_resource: self.active(),
            resources,
        }
    }

    /// Replaces the set of polled resources and reconciles.
    pub fn set_resources<S: AsRef<str>>(&self, names: &[S]) {
        let mut status = lock(&self.status);
        status.set_resources(names);
        info!(resources = ?status.names(), "Liveness resource set updated");
        self.reconcile_locked(&status);
    }

    /// Probes one resource. Any failure, including missing connection
    /// settings, yields `offline` with no data.
    pub async fn poll(&self, name: &str) -> ResourceHealth {
        let settings = match self.settings.read().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(resource = %name, error = %e, "Failed to read settings for health probe");
                return ResourceHealth::offline(name);
            }
        };
        let target = match settings.sink_target(name) {
            Ok(target) => target.for_database(name),
            Err(missing) => {
                debug!(resource = %name, missing, "Connection settings incomplete, marking offline");
                return ResourceHealth::offline(name);
            }
        };

        match self.probe.probe(&target).await {
            Ok(has_data) => ResourceHealth::online(name, has_data),
            Err(e) => {
                debug!(resource = %name, error = %e, "Health probe failed");
                ResourceHealth::offline(name)
            }
        }
    }

    /// Records a probe result and reconciles the active resource.
    pub fn record(&self, health: ResourceHealth) {
        let mut status = lock(&self.status);
        let previous = status.get(&health.name).map(|h| h.status);
        let name = health.name.clone();
        let current = health.status;
        if status.apply(health) {
            if previous.is_some_and(|p| p != current) {
                info!(resource = %name, from = ?previous, to = %current, "Resource health changed");
            }
            metrics::gauge!("resource_health_status", "resource" => name)
                .set(if current == HealthStatus::Online { 1.0 } else { 0.0 });
        }
        self.reconcile_locked(&status);
    }

    /// Polls every known resource once.
    pub async fn poll_all(&self) {
        let names = lock(&self.status).names();
        let mut results = stream::iter(names)
            .map(|name| async move { self.poll(&name).await })
            .buffered(self.concurrency);
        while let Some(health) = results.next().await {
            self.record(health);
        }
    }

    /// Re-evaluates the active resource against the current status map.
    pub fn reconcile(&self) {
        let status = lock(&self.status);
        self.reconcile_locked(&status);
    }

    fn reconcile_locked(&self, status: &StatusMap) {
        let current = self.active();
        let next = select_active(status, current.as_deref());
        let changed = self.active_tx.send_if_modified(|active| {
            if *active == next {
                return false;
            }
            *active = next.clone();
            true
        });
        if changed {
            info!(from = ?current, to = ?next, "Active resource changed");
            metrics::counter!("active_resource_changes_total").increment(1);
        }
    }

    /// Runs the reconciliation loop until shutdown.
    pub fn spawn(self: &Arc<Self>, task_manager: &TaskManager, period: Duration) {
        let monitor = Arc::clone(self);
        let mut shutdown_rx = task_manager.get_shutdown_rx();
        task_manager.spawn("LivenessMonitor", async move {
            debug!("Spawning liveness reconciliation task.");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        info!("Liveness monitor task received shutdown signal.");
                        break;
                    }
                    _ = interval.tick() => {
                        monitor.poll_all().await;
                    }
                }
            }
            info!("Liveness monitor task finished.");
        });
    }
}
