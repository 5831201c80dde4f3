// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! SHT20 simulator configuration
//!
//! The simulator is a Modbus TCP server serving synthetic temperature and
//! humidity registers. It is meant for demos and bench tests without the
//! real gateway.

use serde::{Deserialize, Serialize};

/// Configuration of the simulated SHT20 Modbus server
///
/// # Example
///
/// ```
/// use rust_labmonitor::config::SimulatorConfig;
///
/// let simulator = SimulatorConfig {
///     enabled: true,
///     port: 5021,
///     ..SimulatorConfig::default()
/// };
/// assert_eq!(simulator.address, "127.0.0.1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Start the simulator with the daemon
    pub enabled: bool,

    /// Network address the simulator binds to
    pub address: String,

    /// TCP port of the simulator. The default avoids the privileged port 502.
    pub port: u16,

    /// Interval between two simulated measurement updates
    pub update_interval_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1".to_string(),
            port: 5020,
            update_interval_ms: 5_000,
            seed: None,
        }
    }
}
