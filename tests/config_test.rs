// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use rust_labmonitor::config::Config;
use std::fs;
use std::sync::Once;
use tempfile::tempdir;

static INIT: Once = Once::new();

fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

#[test]
fn test_missing_file_creates_default() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let config = Config::from_file(&config_path)?;
    assert_eq!(config, Config::default());
    assert!(config_path.exists(), "default configuration should be written");

    // The written default must load back unchanged
    let reloaded = Config::from_file(&config_path)?;
    assert_eq!(reloaded, config);
    Ok(())
}

#[test]
fn test_round_trip_with_custom_values() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let mut config = Config::default();
    config.field_bus.polling.endpoint = "10.0.0.12:502".to_string();
    config.field_bus.polling.poll_interval_ms = 1000;
    config.field_bus.polling.degraded_threshold = 3;
    config.field_bus.polling.disconnect_threshold = 6;
    config.field_bus.unit_id = 7;
    config.host_metrics.polling.endpoint = "http://127.0.0.1:9100/temperatures".to_string();
    config.environment.warning_above = 27.5;
    config.simulator.enabled = true;
    config.simulator.seed = Some(42);
    config.save_to_file(&config_path)?;

    let loaded = Config::from_file(&config_path)?;
    assert_eq!(loaded, config);
    Ok(())
}

#[test]
fn test_partial_file_uses_defaults() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(
        &config_path,
        r#"
field_bus:
  enabled: true
  unit_id: 2
  start_address: 16
environment:
  cooling_above: 24.0
  caution_above: 25.0
  warning_above: 26.0
"#,
    )?;

    let config = Config::from_file(&config_path)?;
    assert_eq!(config.field_bus.unit_id, 2);
    assert_eq!(config.field_bus.start_address, 16);
    assert_eq!(config.field_bus.polling, Config::default().field_bus.polling);
    assert_eq!(config.environment.cooling_above, 24.0);
    assert_eq!(config.host_metrics, Config::default().host_metrics);
    Ok(())
}

#[test]
fn test_schema_error_creates_sample_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(
        &config_path,
        r#"
field_bus:
  enabled: "yes"
  unit_id: 300
  start_address: 0
"#,
    )?;

    let result = Config::from_file(&config_path);
    assert!(result.is_err());
    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("validation failed"), "unexpected error: {}", message);

    let sample_path = temp_dir.path().join("config.sample.yaml");
    assert!(sample_path.exists(), "sample configuration should be written");
    let sample = Config::from_file(&sample_path)?;
    assert_eq!(sample, Config::default());
    Ok(())
}

#[test]
fn test_semantic_error_creates_sample_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let mut config = Config::default();
    config.field_bus.polling.degraded_threshold = 8;
    config.field_bus.polling.disconnect_threshold = 6;
    config.save_to_file(&config_path)?;

    let result = Config::from_file(&config_path);
    let message = format!("{:#}", result.unwrap_err());
    assert!(message.contains("Invalid configuration"), "unexpected error: {}", message);
    assert!(temp_dir.path().join("config.sample.yaml").exists());
    Ok(())
}

#[test]
fn test_serial_endpoint_is_rejected() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let mut config = Config::default();
    config.field_bus.polling.endpoint = "/dev/ttyUSB0".to_string();
    config.save_to_file(&config_path)?;

    let message = format!("{:#}", Config::from_file(&config_path).unwrap_err());
    assert!(message.contains("/dev/ttyUSB0"), "unexpected error: {}", message);
    Ok(())
}

#[test]
fn test_apply_args_overrides() {
    setup();
    let mut config = Config::default();
    config.apply_args(
        Some("192.168.1.50:502".to_string()),
        Some("/run/lab/temperatures.json".to_string()),
        false,
        true,
        Some(true),
        Some("0.0.0.0".to_string()),
        Some(15020),
        Some(7),
    );

    assert_eq!(config.field_bus.polling.endpoint, "192.168.1.50:502");
    assert_eq!(config.host_metrics.polling.endpoint, "/run/lab/temperatures.json");
    assert!(config.field_bus.enabled);
    assert!(!config.host_metrics.enabled);
    assert!(config.simulator.enabled);
    assert_eq!(config.simulator.address, "0.0.0.0");
    assert_eq!(config.simulator.port, 15020);
    assert_eq!(config.field_bus.synthetic.seed, Some(7));
    assert_eq!(config.host_metrics.synthetic.seed, Some(7));
    assert_eq!(config.simulator.seed, Some(7));
}

#[test]
fn test_apply_args_without_overrides_keeps_config() {
    let mut config = Config::default();
    config.apply_args(None, None, false, false, None, None, None, None);
    assert_eq!(config, Config::default());
}
