//! Configuration management for DataWatch
//!
//! This module defines the main `Config` struct and its sections. It uses the
//! `figment` crate to layer serialized defaults, an optional TOML file,
//! `DATAWATCH_`-prefixed environment variables and command-line overrides.
//!
//! The runtime settings shared with the dashboard (endpoint, token, data
//! path, active resource) are not part of this file; they live in the
//! settings document at `settings.path`.

use crate::collector::SkipPolicy;
use crate::discovery::LayoutTemplate;
use crate::line_protocol::DEFAULT_PRECISION;
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub use crate::cli::Cli;

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Config {
    pub core: CoreConfig,
    pub sink: SinkConfig,
    pub collector: CollectorConfig,
    pub liveness: LivenessConfig,
    pub settings: SettingsConfig,
    pub control: ControlConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CoreConfig {
    /// The logging level, used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// HTTP client settings for the remote time-series sink.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SinkConfig {
    pub request_timeout_ms: u64,
    /// Timestamp precision sent with every write.
    pub precision: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            precision: DEFAULT_PRECISION.to_string(),
        }
    }
}

impl SinkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CollectorConfig {
    pub interval_seconds: u64,
    /// Start collecting as soon as the process boots.
    pub autostart: bool,
    /// Destination database when no active resource is selected.
    pub default_resource: String,
    pub on_skip: SkipPolicy,
    /// Candidate directory layouts, tried in order.
    pub layouts: Vec<LayoutTemplate>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            autostart: true,
            default_resource: "flightsim".to_string(),
            on_skip: SkipPolicy::Continue,
            layouts: LayoutTemplate::defaults(),
        }
    }
}

impl CollectorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LivenessConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    /// Resources to poll, in discovery order.
    pub resources: Vec<String>,
    /// Measurement whose recent rows count as "has data".
    pub probe_measurement: String,
    /// SQL interval literal for the recency window, e.g. `1 minute`.
    pub probe_window: String,
    /// Maximum number of probes in flight during one tick.
    pub concurrency: usize,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 5,
            resources: Vec::new(),
            probe_measurement: "mqtt_consumer".to_string(),
            probe_window: "1 minute".to_string(),
            concurrency: 4,
        }
    }
}

impl LivenessConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SettingsConfig {
    /// Path of the JSON settings document shared with the dashboard.
    pub path: PathBuf,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("config.json"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    pub listen_address: SocketAddr,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from(([127, 0, 0, 1], 8089)),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and serve `/metrics`.
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Loads the configuration by layering defaults, the optional TOML file
    /// named on the command line, the environment and the CLI flags.
    pub fn load_from_cli(cli: Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(path) = &cli.config_file {
            if !path.exists() {
                bail!("Config file not found at specified path: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        let config: Config = figment
            // e.g. DATAWATCH_COLLECTOR__INTERVAL_SECONDS=30
            .merge(Env::prefixed("DATAWATCH_").split("__"))
            .merge(cli)
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the collector and liveness loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.collector.interval_seconds == 0 {
            bail!("collector.interval_seconds must be at least 1");
        }
        if self.liveness.interval_seconds == 0 {
            bail!("liveness.interval_seconds must be at least 1");
        }
        if self.liveness.concurrency == 0 {
            bail!("liveness.concurrency must be at least 1");
        }
        if self.collector.layouts.is_empty() {
            bail!("collector.layouts must contain at least one layout");
        }
        for layout in &self.collector.layouts {
            let absolute = std::iter::once(&layout.primary)
                .chain(layout.archive.as_ref())
                .find(|p| std::path::Path::new(p).is_absolute());
            if let Some(path) = absolute {
                bail!("layout paths must be relative to the data path, got '{path}'");
            }
        }
        Ok(())
    }
}
