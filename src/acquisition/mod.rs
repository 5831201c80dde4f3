// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Data acquisition for the lab monitoring dashboard
//!
//! This module owns everything between the transport drivers and the
//! presentation layer:
//! - [`decoder`]: raw register words and telemetry payloads to validated readings
//! - [`source`]: per-feed glue combining a transport, the decoder and a
//!   synthetic generator
//! - [`poller`]: connection lifecycle, polling cadence and fallback
//! - [`synthetic`]: clearly-labeled substitute readings
//! - [`shared_state`]: the published, read-only feed state
//! - [`monitoring`]: status rules applied to published readings

pub mod decoder;
pub mod monitoring;
pub mod poller;
pub mod shared_state;
pub mod source;
pub mod synthetic;

pub use decoder::DecodeError;
pub use poller::{Poller, PollerError};
pub use shared_state::{FeedState, FeedStatePublisher, SubscriptionId};
pub use source::{FeedSource, FieldBusSource, HostMetricsSource};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::drivers::TransportError;
use crate::utility::history_buffer::Timestamped;

/// Origin of a published reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    /// Read from the hardware
    Live,
    /// Produced by a synthetic generator while the hardware is unavailable
    Synthetic,
}

/// Connection lifecycle of one feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Connected, but recent reads failed below the disconnect threshold
    Degraded,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

/// Temperature and humidity from the field-bus environment sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub timestamp: DateTime<Utc>,
    /// Temperature in degrees Celsius, within [-40, 125]
    pub temperature: f64,
    /// Relative humidity in percent, within [0, 100]
    pub humidity: f64,
    pub source: ReadingSource,
}

/// Kind of hardware component reporting a temperature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Cpu,
    Disk,
    Other,
}

/// Temperature of one hardware component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentTemperature {
    pub component_id: String,
    pub label: String,
    /// Temperature in degrees Celsius
    pub temperature: f64,
    pub kind: ComponentKind,
}

/// All component temperatures produced by one host-metrics poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub components: Vec<ComponentTemperature>,
    pub source: ReadingSource,
}

/// A reading a feed can publish
pub trait FeedReading: Timestamped + Clone + fmt::Debug + Send + Sync + 'static {
    fn source(&self) -> ReadingSource;
}

impl Timestamped for SensorReading {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl FeedReading for SensorReading {
    fn source(&self) -> ReadingSource {
        self.source
    }
}

impl Timestamped for MetricsSnapshot {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl FeedReading for MetricsSnapshot {
    fn source(&self) -> ReadingSource {
        self.source
    }
}

/// Failure of one poll: either the transport or the payload was bad
///
/// Both kinds count identically towards the disconnect threshold.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AcquisitionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
