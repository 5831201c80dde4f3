// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Host hardware telemetry configuration

use serde::{Deserialize, Serialize};

use super::PollingConfig;
use crate::acquisition::ComponentKind;

/// One component reported by the synthetic host-metrics generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticComponentConfig {
    pub id: String,
    pub label: String,
    pub kind: ComponentKind,
    /// Base temperature used until a live snapshot has been seen (°C)
    pub temperature: f64,
}

impl SyntheticComponentConfig {
    fn new(id: &str, label: &str, kind: ComponentKind, temperature: f64) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            kind,
            temperature,
        }
    }
}

/// Parameters of the substitute host-metrics snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticMetricsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Amplitude of the daily swing applied to every component (°C)
    pub amplitude: f64,

    /// Bound of the uniform jitter applied to every component (°C)
    pub jitter: f64,

    /// Components reported before any live snapshot exists
    pub components: Vec<SyntheticComponentConfig>,
}

impl Default for SyntheticMetricsConfig {
    fn default() -> Self {
        Self {
            seed: None,
            amplitude: 2.0,
            jitter: 1.0,
            components: vec![
                SyntheticComponentConfig::new("cpu-01", "CPU-01", ComponentKind::Cpu, 55.0),
                SyntheticComponentConfig::new("cpu-02", "CPU-02", ComponentKind::Cpu, 53.5),
                SyntheticComponentConfig::new("hdd-01", "HDD-01", ComponentKind::Disk, 38.0),
            ],
        }
    }
}

/// Configuration of the host hardware telemetry feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMetricsConfig {
    pub enabled: bool,

    #[serde(default = "PollingConfig::host_metrics_default")]
    pub polling: PollingConfig,

    #[serde(default)]
    pub synthetic: SyntheticMetricsConfig,
}

impl Default for HostMetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            polling: PollingConfig::host_metrics_default(),
            synthetic: SyntheticMetricsConfig::default(),
        }
    }
}
