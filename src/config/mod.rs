// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the lab monitor
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema, then against semantic rules the schema
//! cannot express.
//!
//! ## Configuration Structure
//!
//! - `field_bus`: SHT20 environment sensor behind a Modbus TCP gateway
//! - `host_metrics`: host hardware temperatures (local sensors, HTTP or file)
//! - `environment`: cooling and alert thresholds for environment readings
//! - `simulator`: optional simulated SHT20 Modbus server
//!
//! ## Usage
//!
//! ```no_run
//! use rust_labmonitor::config::Config;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file("config.yaml").unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("192.168.1.40:502".to_string()), // Field-bus endpoint
//!     None,                                 // Host-metrics endpoint
//!     false,                                // Disable field bus
//!     false,                                // Disable host metrics
//!     Some(true),                           // Enable simulator
//!     None,                                 // Simulator address
//!     Some(5020),                           // Simulator port
//!     None,                                 // Synthetic seed
//! );
//!
//! println!("Polling every {} ms", config.field_bus.polling.poll_interval_ms);
//! ```

pub mod environment;
pub mod field_bus;
pub mod host_metrics;
pub mod polling;
pub mod simulator;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use environment::EnvironmentThresholds;
pub use field_bus::{FieldBusConfig, RegisterLayout, SyntheticSensorConfig};
pub use host_metrics::{HostMetricsConfig, SyntheticComponentConfig, SyntheticMetricsConfig};
pub use polling::PollingConfig;
pub use simulator::SimulatorConfig;
pub use utils::{is_valid_ip_address, output_config_schema};

/// Semantic configuration errors
///
/// Returned synchronously by [`crate::acquisition::Poller::start`] and by
/// [`utils::validate_specific_rules`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: String },

    #[error("degraded_threshold ({degraded}) must not exceed disconnect_threshold ({disconnect})")]
    ThresholdOrder { degraded: u32, disconnect: u32 },

    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("unsupported endpoint '{endpoint}': {reason}")]
    UnsupportedEndpoint { endpoint: String, reason: String },
}

/// Root configuration structure of the lab monitor
///
/// Every section falls back to its defaults when absent from the file, so a
/// minimal configuration only lists what differs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SHT20 temperature/humidity sensor feed
    #[serde(default)]
    pub field_bus: FieldBusConfig,

    /// Host hardware temperature feed
    #[serde(default)]
    pub host_metrics: HostMetricsConfig,

    /// Thresholds used to label environment readings
    #[serde(default)]
    pub environment: EnvironmentThresholds,

    /// Simulated SHT20 Modbus server
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with the default configuration. A file that
    /// fails validation leaves a `*.sample.yaml` next to it and returns an
    /// error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        let schema_str = include_str!("../../resources/config.schema.json");
        let schema: serde_json::Value =
            serde_json::from_str(schema_str).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err).with_context(|| format!("Invalid configuration in {}", path.display()));
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values
    ///
    /// Only the values explicitly provided override the loaded configuration.
    ///
    /// # Parameters
    ///
    /// * `field_bus_endpoint` - Modbus gateway `host:port`
    /// * `host_metrics_endpoint` - `sysinfo`, a URL or a sensor export file
    /// * `disable_field_bus` - Do not poll the environment sensor
    /// * `disable_host_metrics` - Do not poll host temperatures
    /// * `simulator_enabled` - Start the simulated SHT20 server
    /// * `simulator_address` - Bind address of the simulator
    /// * `simulator_port` - TCP port of the simulator
    /// * `synthetic_seed` - Seed shared by every synthetic generator
    #[allow(clippy::too_many_arguments)]
    pub fn apply_args(
        &mut self,
        field_bus_endpoint: Option<String>,
        host_metrics_endpoint: Option<String>,
        disable_field_bus: bool,
        disable_host_metrics: bool,
        simulator_enabled: Option<bool>,
        simulator_address: Option<String>,
        simulator_port: Option<u16>,
        synthetic_seed: Option<u64>,
    ) {
        if let Some(endpoint) = field_bus_endpoint {
            debug!("Overriding field-bus endpoint from command line: {}", endpoint);
            self.field_bus.polling.endpoint = endpoint;
        }
        if let Some(endpoint) = host_metrics_endpoint {
            debug!("Overriding host-metrics endpoint from command line: {}", endpoint);
            self.host_metrics.polling.endpoint = endpoint;
        }

        if disable_field_bus {
            self.field_bus.enabled = false;
        }
        if disable_host_metrics {
            self.host_metrics.enabled = false;
        }

        if let Some(enabled) = simulator_enabled {
            debug!("Overriding simulator enabled from command line: {}", enabled);
            self.simulator.enabled = enabled;
        }
        if let Some(address) = simulator_address {
            debug!("Overriding simulator address from command line: {}", address);
            self.simulator.address = address;
        }
        if let Some(port) = simulator_port {
            debug!("Overriding simulator port from command line: {}", port);
            self.simulator.port = port;
        }

        if let Some(seed) = synthetic_seed {
            debug!("Using synthetic seed {} from command line", seed);
            self.field_bus.synthetic.seed = Some(seed);
            self.host_metrics.synthetic.seed = Some(seed);
            self.simulator.seed = Some(seed);
        }
    }
}
