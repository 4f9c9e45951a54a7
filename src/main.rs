//! DataWatch - directory-size telemetry collector
//!
//! Runs the collector, the liveness loop and the control server. On SIGHUP
//! the configuration is reloaded and the application rebuilt in place; the
//! collector timer registry is shared across rebuilds so a reload never
//! leaves two collectors running.

use anyhow::Result;
use clap::Parser;
use datawatch::{app::App, cli::Cli, collector::TimerRegistry, config::Config};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

enum Signal {
    Shutdown,
    Reload,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load_from_cli(Cli::parse()) {
        Ok(config) => config,
        Err(err) => {
            tracing_subscriber::fmt().init();
            error!("Failed to load configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.core.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("DataWatch starting up...");
    log_config(&config);

    let registry = TimerRegistry::new();
    let mut prometheus = None;
    let mut config = config;

    loop {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut builder = App::builder(config.clone()).timer_registry(registry.clone());
        if let Some(handle) = prometheus.clone() {
            builder = builder.prometheus_handle(handle);
        }
        let app = builder.build(shutdown_rx).await?;
        prometheus = app.prometheus_handle();
        let app_handle = tokio::spawn(app.run());

        let signal = wait_for_signal().await;
        shutdown_tx.send(true).ok();
        app_handle.await??;

        match signal {
            Signal::Shutdown => break,
            Signal::Reload => match Config::load_from_cli(Cli::parse()) {
                Ok(reloaded) => {
                    info!("Configuration reloaded");
                    config = reloaded;
                    log_config(&config);
                }
                Err(err) => warn!("Reload failed, keeping previous configuration: {:#}", err),
            },
        }
    }

    info!("DataWatch shut down.");
    Ok(())
}

fn log_config(config: &Config) {
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.core.log_level);
    info!("Settings File: {}", config.settings.path.display());
    info!("Collector Interval: {}s", config.collector.interval_seconds);
    info!("Collector Autostart: {}", config.collector.autostart);
    info!("Default Resource: {}", config.collector.default_resource);
    info!("Layouts: {}", config.collector.layouts.len());
    info!(
        "Liveness: {}",
        if config.liveness.enabled {
            format!(
                "enabled every {}s for {:?}",
                config.liveness.interval_seconds, config.liveness.resources
            )
        } else {
            "disabled".to_string()
        }
    );
    info!("Control Address: {}", config.control.listen_address);
    info!("Metrics: {}", if config.metrics.enabled { "Enabled" } else { "Disabled" });
    info!("-------------------------------------------------------");
}

#[cfg(unix)]
async fn wait_for_signal() -> Signal {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGHUP handler, reload disabled");
            tokio::signal::ctrl_c().await.ok();
            return Signal::Shutdown;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down.");
            Signal::Shutdown
        }
        _ = hangup.recv() => {
            info!("SIGHUP received, reloading.");
            Signal::Reload
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Signal {
    tokio::signal::ctrl_c().await.ok();
    info!("Ctrl-C received, shutting down.");
    Signal::Shutdown
}
