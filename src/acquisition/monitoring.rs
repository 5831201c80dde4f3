// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Monitoring rules applied to published readings
//!
//! These helpers turn feed snapshots into the rows and summaries the
//! dashboard displays. Environment labels follow the configured
//! [`EnvironmentThresholds`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::shared_state::FeedState;
use super::{ComponentKind, ComponentTemperature, MetricsSnapshot, ReadingSource, SensorReading};
use crate::config::EnvironmentThresholds;

/// Alert level of an environment reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentStatus {
    Normal,
    Caution,
    Warning,
}

/// Air-conditioning action suggested for an environment reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoolingAction {
    Cooling,
    Standby,
}

impl EnvironmentThresholds {
    pub fn classify(&self, temperature: f64) -> EnvironmentStatus {
        if temperature > self.warning_above {
            EnvironmentStatus::Warning
        } else if temperature > self.caution_above {
            EnvironmentStatus::Caution
        } else {
            EnvironmentStatus::Normal
        }
    }

    pub fn cooling_action(&self, temperature: f64) -> CoolingAction {
        if temperature > self.cooling_above {
            CoolingAction::Cooling
        } else {
            CoolingAction::Standby
        }
    }
}

/// One line of the environment monitoring table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringRow {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub status: EnvironmentStatus,
    pub cooling: CoolingAction,
    pub source: ReadingSource,
}

impl MonitoringRow {
    pub fn from_reading(reading: &SensorReading, thresholds: &EnvironmentThresholds) -> Self {
        Self {
            timestamp: reading.timestamp,
            temperature: reading.temperature,
            humidity: reading.humidity,
            status: thresholds.classify(reading.temperature),
            cooling: thresholds.cooling_action(reading.temperature),
            source: reading.source,
        }
    }
}

/// Rows for the table history of the environment feed, oldest first
pub fn monitoring_rows(
    state: &FeedState<SensorReading>,
    thresholds: &EnvironmentThresholds,
) -> Vec<MonitoringRow> {
    state
        .table_history
        .iter()
        .map(|reading| MonitoringRow::from_reading(reading, thresholds))
        .collect()
}

/// Overview of one host-metrics snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostSummary {
    pub component_count: usize,
    pub cpu_count: usize,
    /// Hottest component that is not a disk
    pub hottest: Option<ComponentTemperature>,
    /// Mean temperature of the CPU components
    pub average_cpu_temperature: Option<f64>,
    pub source: ReadingSource,
}

impl HostSummary {
    pub fn from_snapshot(snapshot: &MetricsSnapshot) -> Self {
        let cpus: Vec<f64> = snapshot
            .components
            .iter()
            .filter(|c| c.kind == ComponentKind::Cpu)
            .map(|c| c.temperature)
            .collect();

        let hottest = snapshot
            .components
            .iter()
            .filter(|c| c.kind != ComponentKind::Disk)
            .max_by(|a, b| a.temperature.total_cmp(&b.temperature))
            .cloned();

        let average_cpu_temperature = if cpus.is_empty() {
            None
        } else {
            Some(cpus.iter().sum::<f64>() / cpus.len() as f64)
        };

        Self {
            component_count: snapshot.components.len(),
            cpu_count: cpus.len(),
            hottest,
            average_cpu_temperature,
            source: snapshot.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(minutes: i64, temperature: f64, source: ReadingSource) -> SensorReading {
        SensorReading {
            timestamp: DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::minutes(minutes),
            temperature,
            humidity: 50.0,
            source,
        }
    }

    fn component(id: &str, temperature: f64, kind: ComponentKind) -> ComponentTemperature {
        ComponentTemperature {
            component_id: id.to_string(),
            label: id.to_uppercase(),
            temperature,
            kind,
        }
    }

    #[test]
    fn test_default_thresholds() {
        let thresholds = EnvironmentThresholds::default();
        assert_eq!(thresholds.classify(24.9), EnvironmentStatus::Normal);
        assert_eq!(thresholds.classify(25.0), EnvironmentStatus::Normal);
        assert_eq!(thresholds.classify(25.1), EnvironmentStatus::Caution);
        assert_eq!(thresholds.classify(26.0), EnvironmentStatus::Caution);
        assert_eq!(thresholds.classify(26.1), EnvironmentStatus::Warning);
        assert_eq!(thresholds.cooling_action(25.0), CoolingAction::Standby);
        assert_eq!(thresholds.cooling_action(25.1), CoolingAction::Cooling);
    }

    #[test]
    fn test_custom_thresholds() {
        let thresholds = EnvironmentThresholds {
            cooling_above: 22.0,
            caution_above: 23.0,
            warning_above: 28.0,
        };
        assert_eq!(thresholds.cooling_action(22.5), CoolingAction::Cooling);
        assert_eq!(thresholds.classify(22.5), EnvironmentStatus::Normal);
        assert_eq!(thresholds.classify(27.0), EnvironmentStatus::Caution);
    }

    #[test]
    fn test_monitoring_rows_follow_table_history() {
        let state = FeedState {
            table_history: vec![
                reading(0, 24.1, ReadingSource::Live),
                reading(10, 25.4, ReadingSource::Live),
                reading(20, 26.3, ReadingSource::Live),
            ],
            ..FeedState::initial("field_bus")
        };
        let rows = monitoring_rows(&state, &EnvironmentThresholds::default());
        assert_eq!(rows.len(), 3);
        assert!(rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        let statuses: Vec<_> = rows.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                EnvironmentStatus::Normal,
                EnvironmentStatus::Caution,
                EnvironmentStatus::Warning
            ]
        );
        assert_eq!(rows[0].cooling, CoolingAction::Standby);
        assert_eq!(rows[2].cooling, CoolingAction::Cooling);
    }

    #[test]
    fn test_host_summary() {
        let snapshot = MetricsSnapshot {
            timestamp: Utc::now(),
            components: vec![
                component("cpu-01", 54.0, ComponentKind::Cpu),
                component("cpu-02", 58.0, ComponentKind::Cpu),
                component("hdd-01", 61.0, ComponentKind::Disk),
                component("vrm", 49.0, ComponentKind::Other),
            ],
            source: ReadingSource::Live,
        };
        let summary = HostSummary::from_snapshot(&snapshot);
        assert_eq!(summary.component_count, 4);
        assert_eq!(summary.cpu_count, 2);
        assert_eq!(summary.hottest.unwrap().component_id, "cpu-02");
        assert_eq!(summary.average_cpu_temperature, Some(56.0));
    }

    #[test]
    fn test_host_summary_without_cpus() {
        let snapshot = MetricsSnapshot {
            timestamp: Utc::now(),
            components: vec![component("nvme", 41.0, ComponentKind::Disk)],
            source: ReadingSource::Synthetic,
        };
        let summary = HostSummary::from_snapshot(&snapshot);
        assert_eq!(summary.cpu_count, 0);
        assert!(summary.hottest.is_none());
        assert!(summary.average_cpu_temperature.is_none());
        assert_eq!(summary.source, ReadingSource::Synthetic);
    }
}
