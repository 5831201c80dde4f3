// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use std::collections::HashSet;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use log::{debug, warn};

use super::{Config, ConfigError};
use crate::drivers::host_metrics::HostMetricsEndpoint;

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./rust_labmonitor --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema_str = include_str!("../../resources/config.schema.json");

    let schema: serde_json::Value =
        serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Check a field-bus endpoint
///
/// Only Modbus TCP `host:port` endpoints are accepted. Serial device paths
/// (`/dev/tty…`, `COMx`) are reported as unsupported.
pub fn validate_field_bus_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let endpoint = endpoint.trim();
    let unsupported = |reason: &str| ConfigError::UnsupportedEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let upper = endpoint.to_ascii_uppercase();
    if endpoint.starts_with("/dev/") || (upper.starts_with("COM") && upper[3..].parse::<u16>().is_ok()) {
        return Err(unsupported("serial field-bus links are not supported, use a Modbus TCP gateway"));
    }

    if endpoint.parse::<SocketAddr>().is_ok() {
        return Ok(());
    }

    // host:port with a host name
    match endpoint.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => Err(unsupported("expected host:port")),
    }
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// # Validation Rules
///
/// - **Polling**: every feed passes [`super::PollingConfig::validate`]
/// - **Endpoints**: the field bus needs `host:port`, host metrics need a
///   non-empty endpoint
/// - **Register layout**: indices inside the read block, positive scale
/// - **Synthetic defaults**: inside the ranges enforced on live readings,
///   unique component ids
/// - **Thresholds**: finite, caution not above warning
/// - **Simulator**: positive update interval, bind address checked when enabled
pub fn validate_specific_rules(config: &Config) -> Result<(), ConfigError> {
    debug!("Performing additional validation checks");

    let field_bus = &config.field_bus;
    field_bus.polling.validate()?;
    validate_field_bus_endpoint(&field_bus.polling.endpoint)?;
    field_bus.layout.validate()?;

    let synthetic = &field_bus.synthetic;
    crate::acquisition::decoder::validate_sensor_values(
        synthetic.default_temperature,
        synthetic.default_humidity,
    )
    .map_err(|e| ConfigError::Invalid {
        field: "field_bus.synthetic".to_string(),
        reason: e.to_string(),
    })?;
    for (field, value) in [
        ("field_bus.synthetic.temperature_amplitude", synthetic.temperature_amplitude),
        ("field_bus.synthetic.humidity_amplitude", synthetic.humidity_amplitude),
        ("field_bus.synthetic.temperature_jitter", synthetic.temperature_jitter),
        ("field_bus.synthetic.humidity_jitter", synthetic.humidity_jitter),
        ("host_metrics.synthetic.amplitude", config.host_metrics.synthetic.amplitude),
        ("host_metrics.synthetic.jitter", config.host_metrics.synthetic.jitter),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Invalid {
                field: field.to_string(),
                reason: format!("{} is not a non-negative number", value),
            });
        }
    }

    let host_metrics = &config.host_metrics;
    host_metrics.polling.validate()?;
    if HostMetricsEndpoint::parse(&host_metrics.polling.endpoint).is_none() {
        return Err(ConfigError::UnsupportedEndpoint {
            endpoint: host_metrics.polling.endpoint.clone(),
            reason: "expected sysinfo, an http(s) URL or a file path".to_string(),
        });
    }

    let components = &host_metrics.synthetic.components;
    if components.is_empty() {
        return Err(ConfigError::Invalid {
            field: "host_metrics.synthetic.components".to_string(),
            reason: "at least one component is required".to_string(),
        });
    }
    let mut ids = HashSet::new();
    for component in components {
        if !ids.insert(component.id.as_str()) {
            return Err(ConfigError::Invalid {
                field: "host_metrics.synthetic.components".to_string(),
                reason: format!("duplicate component id '{}'", component.id),
            });
        }
        crate::acquisition::decoder::validate_component_temperature(
            &component.id,
            component.temperature,
        )
        .map_err(|e| ConfigError::Invalid {
            field: "host_metrics.synthetic.components".to_string(),
            reason: e.to_string(),
        })?;
    }

    config.environment.validate()?;

    if config.simulator.enabled {
        if config.simulator.update_interval_ms == 0 {
            return Err(ConfigError::NotPositive {
                field: "simulator.update_interval_ms".to_string(),
            });
        }
        if !is_valid_ip_address(&config.simulator.address) {
            // Host names are resolved at bind time
            warn!(
                "Potentially invalid simulator address format: {}",
                config.simulator.address
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes() {
        assert!(validate_specific_rules(&Config::default()).is_ok());
    }

    #[test]
    fn test_field_bus_endpoints() {
        assert!(validate_field_bus_endpoint("127.0.0.1:502").is_ok());
        assert!(validate_field_bus_endpoint("[::1]:5020").is_ok());
        assert!(validate_field_bus_endpoint("gateway.lab.local:502").is_ok());
        assert!(matches!(
            validate_field_bus_endpoint("/dev/ttyUSB0"),
            Err(ConfigError::UnsupportedEndpoint { .. })
        ));
        assert!(matches!(
            validate_field_bus_endpoint("COM3"),
            Err(ConfigError::UnsupportedEndpoint { .. })
        ));
        assert!(validate_field_bus_endpoint("gateway").is_err());
    }

    #[test]
    fn test_duplicate_synthetic_components() {
        let mut config = Config::default();
        let first = config.host_metrics.synthetic.components[0].clone();
        config.host_metrics.synthetic.components.push(first);
        assert!(matches!(
            validate_specific_rules(&config),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_synthetic_defaults_must_be_in_range() {
        let mut config = Config::default();
        config.field_bus.synthetic.default_humidity = 140.0;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_invalid_thresholds() {
        let mut config = Config::default();
        config.environment.caution_above = 30.0;
        config.environment.warning_above = 26.0;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_is_valid_ip_address() {
        assert!(is_valid_ip_address("192.168.1.10"));
        assert!(is_valid_ip_address("::1"));
        assert!(is_valid_ip_address("localhost"));
        assert!(!is_valid_ip_address("gateway.lab"));
    }
}
