//! Command-Line Interface (CLI) argument parsing.
//!
//! The arguments are parsed at startup and merged on top of the TOML file
//! and environment variables as the highest-priority `figment` provider.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Background directory-size collector and resource liveness monitor.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Seconds between collection ticks.
    #[arg(long, value_name = "SECONDS")]
    pub interval_seconds: Option<u64>,

    /// Address for the control HTTP server.
    #[arg(long, value_name = "ADDR")]
    pub listen_address: Option<SocketAddr>,

    /// Path of the JSON settings document.
    #[arg(long, value_name = "FILE")]
    pub settings_path: Option<PathBuf>,

    /// Logging level (overridden by RUST_LOG).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Do not start collecting on boot.
    #[arg(long)]
    pub no_autostart: bool,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();
        let mut section = |name: &str, key: &str, value: Value| {
            let entry = dict
                .entry(name.to_string())
                .or_insert_with(|| Value::from(Dict::new()));
            if let Value::Dict(_, inner) = entry {
                inner.insert(key.to_string(), value);
            }
        };

        if let Some(interval) = self.interval_seconds {
            section("collector", "interval_seconds", Value::from(interval));
        }
        if self.no_autostart {
            section("collector", "autostart", Value::from(false));
        }
        if let Some(addr) = self.listen_address {
            section("control", "listen_address", Value::from(addr.to_string()));
        }
        if let Some(path) = &self.settings_path {
            section("settings", "path", Value::from(path.display().to_string()));
        }
        if let Some(level) = &self.log_level {
            section("core", "log_level", Value::from(level.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
