//! The main application wiring, decoupled from the entry point.

use crate::{
    collector::{CollectionCycle, CollectorSupervisor, DirectorySizeCycle, TimerRegistry},
    config::Config,
    control::{ControlServer, ControlState},
    core::{HealthProbe, SampleSink},
    discovery::DirectoryResolver,
    health::{LivenessMonitor, SqlHealthProbe},
    internal_metrics::MetricsBuilder,
    line_protocol::LineProtocolWriter,
    settings::{active_resource_patch, JsonFileSettingsStore, SettingsStore},
    task_manager::TaskManager,
};
use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
    control_addr: SocketAddr,
    supervisor: CollectorSupervisor,
    liveness: Option<Arc<LivenessMonitor>>,
    prometheus: Option<PrometheusHandle>,
}

impl App {
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The address the control server is listening on.
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    pub fn supervisor(&self) -> &CollectorSupervisor {
        &self.supervisor
    }

    pub fn liveness(&self) -> Option<&Arc<LivenessMonitor>> {
        self.liveness.as_ref()
    }

    /// The Prometheus handle, reusable by a rebuilt `App` in the same process.
    pub fn prometheus_handle(&self) -> Option<PrometheusHandle> {
        self.prometheus.clone()
    }

    /// Waits for the shutdown signal, stops the collector and waits for all
    /// tasks to finish.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        shutdown_rx.changed().await.ok();
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.supervisor.stop();
        self.task_manager.shutdown().await;

        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Every external collaborator can be overridden for tests.
pub struct AppBuilder {
    config: Config,
    settings_override: Option<Arc<dyn SettingsStore>>,
    sink_override: Option<Arc<dyn SampleSink>>,
    probe_override: Option<Arc<dyn HealthProbe>>,
    cycle_override: Option<Arc<dyn CollectionCycle>>,
    timer_registry: Option<TimerRegistry>,
    prometheus: Option<PrometheusHandle>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            settings_override: None,
            sink_override: None,
            probe_override: None,
            cycle_override: None,
            timer_registry: None,
            prometheus: None,
        }
    }

    /// Overrides the settings store.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_override = Some(store);
        self
    }

    /// Overrides the sample sink used by the default collection cycle.
    pub fn sample_sink(mut self, sink: Arc<dyn SampleSink>) -> Self {
        self.sink_override = Some(sink);
        self
    }

    /// Overrides the liveness health probe.
    pub fn health_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe_override = Some(probe);
        self
    }

    /// Replaces the whole collection cycle.
    pub fn collection_cycle(mut self, cycle: Arc<dyn CollectionCycle>) -> Self {
        self.cycle_override = Some(cycle);
        self
    }

    /// Shares a timer registry across successive builds, so a rebuilt app
    /// cancels the collector timer its predecessor left behind.
    pub fn timer_registry(mut self, registry: TimerRegistry) -> Self {
        self.timer_registry = Some(registry);
        self
    }

    /// Reuses an already-installed Prometheus recorder.
    pub fn prometheus_handle(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Builds and starts all application components.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        config.validate()?;
        let task_manager = TaskManager::new(shutdown_rx.clone());

        // =========================================================================
        // 1. Metrics
        // =========================================================================
        let prometheus = match self.prometheus {
            Some(handle) => Some(handle),
            None => MetricsBuilder::new(config.metrics.clone()).build(),
        };

        // =========================================================================
        // 2. Collaborators
        // =========================================================================
        let settings: Arc<dyn SettingsStore> = match self.settings_override {
            Some(store) => store,
            None => {
                debug!(path = %config.settings.path.display(), "Using JSON settings file");
                Arc::new(JsonFileSettingsStore::new(&config.settings.path))
            }
        };

        let cycle: Arc<dyn CollectionCycle> = match self.cycle_override {
            Some(cycle) => cycle,
            None => {
                let sink: Arc<dyn SampleSink> = match self.sink_override {
                    Some(sink) => sink,
                    None => Arc::new(LineProtocolWriter::new(
                        config.sink.request_timeout(),
                        config.sink.precision.clone(),
                    )?),
                };
                Arc::new(DirectorySizeCycle::new(
                    settings.clone(),
                    DirectoryResolver::new(config.collector.layouts.clone()),
                    sink,
                    config.collector.default_resource.clone(),
                ))
            }
        };

        // =========================================================================
        // 3. Collector supervisor
        // =========================================================================
        let registry = self.timer_registry.unwrap_or_default();
        let supervisor = CollectorSupervisor::initialize(
            registry,
            cycle,
            config.collector.on_skip,
            config.collector.interval(),
        );

        // =========================================================================
        // 4. Liveness loop
        // =========================================================================
        let liveness = if config.liveness.enabled && !config.liveness.resources.is_empty() {
            let probe: Arc<dyn HealthProbe> = match self.probe_override {
                Some(probe) => probe,
                None => Arc::new(SqlHealthProbe::new(
                    config.sink.request_timeout(),
                    &config.liveness.probe_measurement,
                    &config.liveness.probe_window,
                )?),
            };
            let monitor = LivenessMonitor::new(
                settings.clone(),
                probe,
                &config.liveness.resources,
                config.liveness.concurrency,
            );
            monitor.spawn(&task_manager, config.liveness.interval());

            let active_rx = monitor.subscribe();
            let persister_settings = settings.clone();
            let persister_shutdown = task_manager.get_shutdown_rx();
            task_manager.spawn(
                "ActiveResourcePersister",
                persist_active_resource(persister_settings, active_rx, persister_shutdown),
            );
            info!(resources = ?config.liveness.resources, "Liveness monitoring enabled");
            Some(monitor)
        } else {
            debug!("Liveness monitoring disabled");
            None
        };

        // =========================================================================
        // 5. Control server
        // =========================================================================
        let state = ControlState {
            supervisor: supervisor.clone(),
            liveness: liveness.clone(),
            settings,
            prometheus: prometheus.clone(),
        };
        let (server, control_addr) =
            ControlServer::bind(config.control.listen_address, state, shutdown_rx).await?;
        task_manager.spawn("ControlServer", server.run());
        info!(address = %control_addr, "Control server listening");

        // =========================================================================
        // 6. Autostart
        // =========================================================================
        if config.collector.autostart {
            supervisor.start(config.collector.interval());
        }

        Ok(App {
            task_manager,
            control_addr,
            supervisor,
            liveness,
            prometheus,
        })
    }
}

/// Writes every active-resource change back to the settings document so the
/// collector's destination follows the reconciled choice. Clearing the
/// selection removes the key and its legacy alias.
async fn persist_active_resource(
    settings: Arc<dyn SettingsStore>,
    mut active_rx: watch::Receiver<Option<String>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            changed = active_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let active = active_rx.borrow_and_update().clone();
                match settings.write(active_resource_patch(active.as_deref())).await {
                    Ok(_) => info!(active_resource = ?active, "Persisted active resource"),
                    Err(e) => error!(error = %e, "Failed to persist active resource"),
                }
            }
        }
    }
    debug!("Active resource persister finished.");
}
