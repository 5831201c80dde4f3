// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Polling configuration shared by every feed
//!
//! Each feed section of the configuration file carries one `polling` block.
//! The same structure is handed to [`crate::acquisition::Poller::start`],
//! which validates it again before spawning the poll task.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default reconnect schedule in milliseconds; the last step is the ceiling
pub const DEFAULT_RECONNECT_BACKOFF_MS: [u64; 4] = [1_000, 2_000, 5_000, 10_000];

const TEN_MINUTES_MS: u64 = 600_000;
const ONE_HOUR_MS: u64 = 3_600_000;

fn default_reconnect_backoff() -> Vec<u64> {
    DEFAULT_RECONNECT_BACKOFF_MS.to_vec()
}

/// Polling, fallback and retention settings of one feed
///
/// # Example
///
/// ```
/// use rust_labmonitor::config::PollingConfig;
///
/// let mut polling = PollingConfig::field_bus_default();
/// polling.degraded_threshold = 3;
/// polling.disconnect_threshold = 6;
/// assert!(polling.validate().is_ok());
///
/// polling.degraded_threshold = 7;
/// assert!(polling.validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Time between two poll ticks
    pub poll_interval_ms: u64,

    /// Upper bound for one connect or read operation
    pub timeout_ms: u64,

    /// Consecutive failures after which a connected feed reports `Degraded`
    pub degraded_threshold: u32,

    /// Consecutive failures after which the connection is dropped and
    /// synthetic readings are published
    pub disconnect_threshold: u32,

    /// Number of coarse samples kept for charts
    pub chart_history_capacity: usize,

    /// Number of fine samples kept for the monitoring table
    pub table_history_capacity: usize,

    /// Minimum spacing between two chart samples (0 keeps every reading)
    #[serde(default = "default_chart_sample_interval")]
    pub chart_sample_interval_ms: u64,

    /// Minimum spacing between two table samples (0 keeps every reading)
    #[serde(default = "default_table_sample_interval")]
    pub table_sample_interval_ms: u64,

    /// Delay before each reconnect attempt while disconnected
    ///
    /// Successive failed attempts walk the list; the last entry is repeated.
    /// An empty list retries on every tick.
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff_ms: Vec<u64>,

    /// Feed endpoint: `host:port` for the field bus, `sysinfo`, a URL or a
    /// file path for host metrics
    pub endpoint: String,
}

fn default_chart_sample_interval() -> u64 {
    ONE_HOUR_MS
}

fn default_table_sample_interval() -> u64 {
    TEN_MINUTES_MS
}

impl PollingConfig {
    /// Defaults for the SHT20 field-bus sensor
    pub fn field_bus_default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            timeout_ms: 3_000,
            degraded_threshold: 3,
            disconnect_threshold: 6,
            chart_history_capacity: 24,
            table_history_capacity: 12,
            chart_sample_interval_ms: ONE_HOUR_MS,
            table_sample_interval_ms: TEN_MINUTES_MS,
            reconnect_backoff_ms: default_reconnect_backoff(),
            endpoint: "127.0.0.1:502".to_string(),
        }
    }

    /// Defaults for the host hardware telemetry feed
    pub fn host_metrics_default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            timeout_ms: 2_000,
            degraded_threshold: 3,
            disconnect_threshold: 6,
            chart_history_capacity: 24,
            table_history_capacity: 12,
            chart_sample_interval_ms: ONE_HOUR_MS,
            table_sample_interval_ms: TEN_MINUTES_MS,
            reconnect_backoff_ms: default_reconnect_backoff(),
            endpoint: crate::drivers::host_metrics::SYSINFO_ENDPOINT.to_string(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn chart_sample_interval(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.chart_sample_interval_ms as i64)
    }

    pub fn table_sample_interval(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.table_sample_interval_ms as i64)
    }

    /// Check the feed-independent rules
    ///
    /// Endpoint syntax is feed specific and is checked by
    /// [`super::utils::validate_specific_rules`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("timeout_ms", self.timeout_ms),
            ("degraded_threshold", self.degraded_threshold as u64),
            ("disconnect_threshold", self.disconnect_threshold as u64),
            ("chart_history_capacity", self.chart_history_capacity as u64),
            ("table_history_capacity", self.table_history_capacity as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::NotPositive {
                    field: field.to_string(),
                });
            }
        }

        if self.degraded_threshold > self.disconnect_threshold {
            return Err(ConfigError::ThresholdOrder {
                degraded: self.degraded_threshold,
                disconnect: self.disconnect_threshold,
            });
        }

        // chrono durations are i64 milliseconds
        for (field, value) in [
            ("chart_sample_interval_ms", self.chart_sample_interval_ms),
            ("table_sample_interval_ms", self.table_sample_interval_ms),
        ] {
            if value > i64::MAX as u64 {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: format!("{} is too large", value),
                });
            }
        }

        if self.reconnect_backoff_ms.contains(&0) {
            return Err(ConfigError::Invalid {
                field: "reconnect_backoff_ms".to_string(),
                reason: "steps must be greater than zero".to_string(),
            });
        }

        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "endpoint".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PollingConfig::field_bus_default().validate().is_ok());
        assert!(PollingConfig::host_metrics_default().validate().is_ok());
    }

    #[test]
    fn test_zero_values_are_rejected() {
        let mut config = PollingConfig::field_bus_default();
        config.table_history_capacity = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive {
                field: "table_history_capacity".to_string()
            })
        );

        let mut config = PollingConfig::field_bus_default();
        config.poll_interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::NotPositive { .. })));
    }

    #[test]
    fn test_threshold_order() {
        let mut config = PollingConfig::host_metrics_default();
        config.degraded_threshold = 6;
        config.disconnect_threshold = 6;
        assert!(config.validate().is_ok());

        config.degraded_threshold = 7;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ThresholdOrder {
                degraded: 7,
                disconnect: 6
            })
        );
    }

    #[test]
    fn test_backoff_and_endpoint_rules() {
        let mut config = PollingConfig::field_bus_default();
        config.reconnect_backoff_ms = vec![];
        assert!(config.validate().is_ok());

        config.reconnect_backoff_ms = vec![500, 0];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = PollingConfig::field_bus_default();
        config.endpoint = "   ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_optional_fields_take_defaults() {
        let yaml = r#"
poll_interval_ms: 1000
timeout_ms: 500
degraded_threshold: 3
disconnect_threshold: 6
chart_history_capacity: 24
table_history_capacity: 12
endpoint: "10.0.0.7:502"
"#;
        let config: PollingConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.reconnect_backoff_ms, DEFAULT_RECONNECT_BACKOFF_MS.to_vec());
        assert_eq!(config.table_sample_interval_ms, 600_000);
        assert_eq!(config.chart_sample_interval(), chrono::Duration::hours(1));
    }
}
