#![allow(dead_code)]
//! Test helpers for running the full application instance.

use anyhow::Result;
use datawatch::{
    app::App,
    collector::{CollectionCycle, CollectorSupervisor, TimerRegistry},
    config::Config,
    core::{HealthProbe, SampleSink},
    health::LivenessMonitor,
    settings::SettingsStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::watch, task::JoinHandle, time::timeout};

/// A running application instance.
pub struct TestApp {
    pub shutdown_tx: watch::Sender<bool>,
    pub app_handle: Option<JoinHandle<Result<()>>>,
    pub supervisor: CollectorSupervisor,
    pub liveness: Option<Arc<LivenessMonitor>>,
    control_addr: SocketAddr,
    client: reqwest::Client,
}

impl TestApp {
    /// Base URL of the control server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.control_addr, path)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Shuts down the application and waits for it to terminate.
    pub async fn shutdown(self, timeout_duration: Duration) -> Result<()> {
        self.shutdown_tx.send(true)?;
        if let Some(handle) = self.app_handle {
            match timeout(timeout_duration, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(anyhow::anyhow!("App failed to shut down within the timeout")),
            }
        } else {
            Ok(())
        }
    }
}

/// A builder for `TestApp` instances.
pub struct TestAppBuilder {
    pub config: Config,
    settings: Option<Arc<dyn SettingsStore>>,
    sink: Option<Arc<dyn SampleSink>>,
    probe: Option<Arc<dyn HealthProbe>>,
    registry: Option<TimerRegistry>,
    cycle: Option<Arc<dyn CollectionCycle>>,
}

impl TestAppBuilder {
    /// Defaults: ephemeral control port, no metrics, no autostart.
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let mut config = Config::default();
        config.control.listen_address = SocketAddr::from(([127, 0, 0, 1], 0));
        config.metrics.enabled = false;
        config.collector.autostart = false;
        Self {
            config,
            settings: None,
            sink: None,
            probe: None,
            registry: None,
            cycle: None,
        }
    }

    pub fn with_config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn SampleSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_registry(mut self, registry: TimerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_cycle(mut self, cycle: Arc<dyn CollectionCycle>) -> Self {
        self.cycle = Some(cycle);
        self
    }

    pub async fn start(self) -> Result<TestApp> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut builder = App::builder(self.config);
        if let Some(settings) = self.settings {
            builder = builder.settings_store(settings);
        }
        if let Some(sink) = self.sink {
            builder = builder.sample_sink(sink);
        }
        if let Some(probe) = self.probe {
            builder = builder.health_probe(probe);
        }
        if let Some(registry) = self.registry {
            builder = builder.timer_registry(registry);
        }
        if let Some(cycle) = self.cycle {
            builder = builder.collection_cycle(cycle);
        }

        let app = builder.build(shutdown_rx).await?;
        let control_addr = app.control_addr();
        let supervisor = app.supervisor().clone();
        let liveness = app.liveness().cloned();
        let app_handle = tokio::spawn(app.run());

        Ok(TestApp {
            shutdown_tx,
            app_handle: Some(app_handle),
            supervisor,
            liveness,
            control_addr,
            client: reqwest::Client::new(),
        })
    }
}
