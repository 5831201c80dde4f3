// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Field-bus sensor configuration
//!
//! Settings for the SHT20 temperature/humidity sensor reached through a
//! Modbus TCP gateway.

use serde::{Deserialize, Serialize};

use super::{ConfigError, PollingConfig};

/// Position and scaling of the measurements inside the register block
///
/// The poller reads `register_count` holding registers starting at
/// [`FieldBusConfig::start_address`]; the indices are word offsets inside
/// that block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterLayout {
    /// Number of consecutive registers read on every poll
    pub register_count: u16,

    /// Word offset of the signed temperature register
    pub temperature_index: u16,

    /// Word offset of the unsigned humidity register
    pub humidity_index: u16,

    /// Raw value divisor (10 gives a 0.1 resolution)
    pub scale: f64,
}

impl Default for RegisterLayout {
    fn default() -> Self {
        Self {
            register_count: 2,
            temperature_index: 0,
            humidity_index: 1,
            scale: 10.0,
        }
    }
}

impl RegisterLayout {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.register_count == 0 {
            return Err(ConfigError::NotPositive {
                field: "layout.register_count".to_string(),
            });
        }
        // Modbus limits a single read to 125 registers
        if self.register_count > 125 {
            return Err(ConfigError::Invalid {
                field: "layout.register_count".to_string(),
                reason: format!("{} exceeds the 125 register read limit", self.register_count),
            });
        }
        for (field, index) in [
            ("layout.temperature_index", self.temperature_index),
            ("layout.humidity_index", self.humidity_index),
        ] {
            if index >= self.register_count {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: format!("{} is outside a block of {} registers", index, self.register_count),
                });
            }
        }
        if self.temperature_index == self.humidity_index {
            return Err(ConfigError::Invalid {
                field: "layout.humidity_index".to_string(),
                reason: "temperature and humidity cannot share a register".to_string(),
            });
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "layout.scale".to_string(),
                reason: format!("{} is not a positive number", self.scale),
            });
        }
        Ok(())
    }
}

/// Parameters of the substitute environment readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSensorConfig {
    /// Fixed RNG seed; a random one is drawn at startup when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Base temperature used until a live reading has been seen (°C)
    pub default_temperature: f64,

    /// Base humidity used until a live reading has been seen (%RH)
    pub default_humidity: f64,

    /// Amplitude of the daily temperature swing (°C)
    pub temperature_amplitude: f64,

    /// Amplitude of the daily humidity swing (%RH)
    pub humidity_amplitude: f64,

    /// Bound of the uniform temperature jitter (°C)
    pub temperature_jitter: f64,

    /// Bound of the uniform humidity jitter (%RH)
    pub humidity_jitter: f64,
}

impl Default for SyntheticSensorConfig {
    fn default() -> Self {
        Self {
            seed: None,
            default_temperature: 24.5,
            default_humidity: 48.2,
            temperature_amplitude: 0.8,
            humidity_amplitude: 3.0,
            temperature_jitter: 0.2,
            humidity_jitter: 0.8,
        }
    }
}

/// Configuration of the field-bus environment feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldBusConfig {
    /// Poll the sensor at all
    pub enabled: bool,

    /// Modbus unit identifier of the sensor behind the gateway
    pub unit_id: u8,

    /// First holding register of the measurement block
    pub start_address: u16,

    #[serde(default)]
    pub layout: RegisterLayout,

    #[serde(default = "PollingConfig::field_bus_default")]
    pub polling: PollingConfig,

    #[serde(default)]
    pub synthetic: SyntheticSensorConfig,
}

impl Default for FieldBusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            unit_id: 1,
            start_address: 0,
            layout: RegisterLayout::default(),
            polling: PollingConfig::field_bus_default(),
            synthetic: SyntheticSensorConfig::default(),
        }
    }
}
