use clap::Parser;
use datawatch::collector::SkipPolicy;
use datawatch::config::{Cli, Config};
use datawatch::discovery::ScanTarget;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Runs `test_fn` with a temporary TOML file.
fn with_config_file<F>(toml_content: &str, test_fn: F)
where
    F: FnOnce(PathBuf),
{
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml_content).unwrap();
    test_fn(file.path().to_path_buf());
}

fn load(args: &[&str]) -> anyhow::Result<Config> {
    let mut argv = vec!["datawatch"];
    argv.extend_from_slice(args);
    Config::load_from_cli(Cli::try_parse_from(argv).unwrap())
}

#[test]
fn test_load_full_valid_config() {
    let toml_content = r#"
        [core]
        log_level = "debug"
        [sink]
        request_timeout_ms = 2500
        [collector]
        interval_seconds = 30
        autostart = false
        default_resource = "telemetry"
        on_skip = "stop"
        layouts = [
            { primary = "{resource}/live", archive = "{resource}/compacted" },
            { primary = "gens", scan = "primary" },
        ]
        [liveness]
        enabled = true
        interval_seconds = 15
        resources = ["flightsim", "telemetry"]
        probe_window = "5 minutes"
        [settings]
        path = "/etc/datawatch/config.json"
        [control]
        listen_address = "0.0.0.0:9000"
        [metrics]
        enabled = false
    "#;

    with_config_file(toml_content, |path| {
        let config = load(&["--config-file", path.to_str().unwrap()]).unwrap();
        assert_eq!(config.core.log_level, "debug");
        assert_eq!(config.sink.request_timeout_ms, 2500);
        assert_eq!(config.sink.precision, "nanosecond");
        assert_eq!(config.collector.interval_seconds, 30);
        assert!(!config.collector.autostart);
        assert_eq!(config.collector.default_resource, "telemetry");
        assert_eq!(config.collector.on_skip, SkipPolicy::Stop);
        assert_eq!(config.collector.layouts.len(), 2);
        assert_eq!(config.collector.layouts[0].archive.as_deref(), Some("{resource}/compacted"));
        assert_eq!(config.collector.layouts[0].scan, ScanTarget::None);
        assert_eq!(config.collector.layouts[1].scan, ScanTarget::Primary);
        assert!(config.liveness.enabled);
        assert_eq!(config.liveness.resources, vec!["flightsim", "telemetry"]);
        assert_eq!(config.liveness.probe_window, "5 minutes");
        assert_eq!(config.liveness.probe_measurement, "mqtt_consumer");
        assert_eq!(config.settings.path, PathBuf::from("/etc/datawatch/config.json"));
        assert_eq!(config.control.listen_address.port(), 9000);
        assert!(!config.metrics.enabled);
    });
}

#[test]
fn test_partial_config_keeps_defaults() {
    with_config_file("[collector]\ninterval_seconds = 20\n", |path| {
        let config = load(&["--config-file", path.to_str().unwrap()]).unwrap();
        assert_eq!(config.collector.interval_seconds, 20);
        assert!(config.collector.autostart);
        assert_eq!(config.collector.layouts.len(), 3);
        assert_eq!(config.liveness.interval_seconds, 5);
    });
}

#[test]
fn test_cli_overrides_file() {
    with_config_file("[collector]\ninterval_seconds = 20\n", |path| {
        let config = load(&[
            "--config-file",
            path.to_str().unwrap(),
            "--interval-seconds",
            "45",
            "--listen-address",
            "127.0.0.1:7000",
            "--settings-path",
            "/tmp/settings.json",
            "--no-autostart",
        ])
        .unwrap();
        assert_eq!(config.collector.interval_seconds, 45);
        assert!(!config.collector.autostart);
        assert_eq!(config.control.listen_address.port(), 7000);
        assert_eq!(config.settings.path, PathBuf::from("/tmp/settings.json"));
    });
}

#[test]
fn test_env_overrides_nested_key() {
    std::env::set_var("DATAWATCH_LIVENESS__CONCURRENCY", "9");
    let config = load(&[]).unwrap();
    std::env::remove_var("DATAWATCH_LIVENESS__CONCURRENCY");
    assert_eq!(config.liveness.concurrency, 9);
}

#[test]
fn test_invalid_value_type() {
    with_config_file("[collector]\ninterval_seconds = \"often\"\n", |path| {
        let err = load(&["--config-file", path.to_str().unwrap()]).unwrap_err();
        assert!(err.to_string().contains("interval_seconds"), "{err}");
    });
}

#[test]
fn test_zero_interval_is_rejected() {
    with_config_file("[liveness]\ninterval_seconds = 0\n", |path| {
        let err = load(&["--config-file", path.to_str().unwrap()]).unwrap_err();
        assert!(err.to_string().contains("liveness.interval_seconds"));
    });
}

#[test]
fn test_non_existent_config_file() {
    let err = load(&["--config-file", "/path/to/non/existent/config.toml"]).unwrap_err();
    assert!(err.to_string().contains("Config file not found at specified path"));
}
