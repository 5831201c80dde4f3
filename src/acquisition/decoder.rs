// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Reading decoder
//!
//! Pure, stateless conversion of raw transport payloads into validated
//! domain values.
//!
//! ## SHT20 register map
//!
//! The sensor exposes its measurements as holding registers, in units of
//! `1 / scale` (0.1 with the default scale of 10):
//!
//! - temperature: signed 16-bit word, °C
//! - humidity: unsigned 16-bit word, %RH
//!
//! The word positions inside the read block come from [`RegisterLayout`].
//!
//! ## Host metrics payload
//!
//! A JSON array, one object per hardware component:
//!
//! ```json
//! [
//!   {"id": "cpu-01", "label": "CPU-01", "value": 54.5, "kind": "cpu"},
//!   {"id": "hdd-01", "label": "HDD-01", "temperature": 38.0}
//! ]
//! ```
//!
//! `label` defaults to `id`, `kind` is inferred from the label when absent.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use super::{ComponentKind, ComponentTemperature, MetricsSnapshot, ReadingSource, SensorReading};
use crate::config::field_bus::RegisterLayout;

/// Lowest temperature an environment reading may report (°C)
pub const SENSOR_TEMPERATURE_MIN: f64 = -40.0;
/// Highest temperature an environment reading may report (°C)
pub const SENSOR_TEMPERATURE_MAX: f64 = 125.0;
pub const HUMIDITY_MIN: f64 = 0.0;
pub const HUMIDITY_MAX: f64 = 100.0;
/// Plausible bounds for a hardware component temperature (°C)
pub const COMPONENT_TEMPERATURE_MIN: f64 = -40.0;
pub const COMPONENT_TEMPERATURE_MAX: f64 = 150.0;

/// Payload shape or range violations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// A decoded value is outside its physical range or not finite
    #[error("{field} value {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
    /// The payload length or structure is wrong
    #[error("malformed payload: {0}")]
    Malformed(String),
}

fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<f64, DecodeError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(DecodeError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        })
    }
}

/// Validate an environment temperature/humidity pair
pub fn validate_sensor_values(temperature: f64, humidity: f64) -> Result<(), DecodeError> {
    check_range(
        "temperature",
        temperature,
        SENSOR_TEMPERATURE_MIN,
        SENSOR_TEMPERATURE_MAX,
    )?;
    check_range("humidity", humidity, HUMIDITY_MIN, HUMIDITY_MAX)?;
    Ok(())
}

/// Validate one component temperature
pub fn validate_component_temperature(component_id: &str, temperature: f64) -> Result<(), DecodeError> {
    check_range(
        component_id,
        temperature,
        COMPONENT_TEMPERATURE_MIN,
        COMPONENT_TEMPERATURE_MAX,
    )
    .map(|_| ())
}

/// Decode the SHT20 register block into a live [`SensorReading`]
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use rust_labmonitor::acquisition::decoder::decode_sensor;
/// use rust_labmonitor::config::field_bus::RegisterLayout;
///
/// let reading = decode_sensor(&[245, 482], &RegisterLayout::default(), Utc::now()).unwrap();
/// assert_eq!(reading.temperature, 24.5);
/// assert_eq!(reading.humidity, 48.2);
/// ```
pub fn decode_sensor(
    registers: &[u16],
    layout: &RegisterLayout,
    timestamp: DateTime<Utc>,
) -> Result<SensorReading, DecodeError> {
    if registers.len() != layout.register_count as usize {
        return Err(DecodeError::Malformed(format!(
            "expected {} registers, got {}",
            layout.register_count,
            registers.len()
        )));
    }

    let word = |index: u16, name: &str| {
        registers.get(index as usize).copied().ok_or_else(|| {
            DecodeError::Malformed(format!("{} register {} outside the read block", name, index))
        })
    };

    // The temperature word is two's complement
    let temperature = word(layout.temperature_index, "temperature")? as i16 as f64 / layout.scale;
    let humidity = word(layout.humidity_index, "humidity")? as f64 / layout.scale;

    validate_sensor_values(temperature, humidity)?;

    Ok(SensorReading {
        timestamp,
        temperature,
        humidity,
        source: ReadingSource::Live,
    })
}

/// Encode a temperature/humidity pair into the register block layout
///
/// This is the inverse of [`decode_sensor`] and is used by the sensor
/// simulator.
pub fn encode_sensor(
    temperature: f64,
    humidity: f64,
    layout: &RegisterLayout,
) -> Result<Vec<u16>, DecodeError> {
    validate_sensor_values(temperature, humidity)?;

    let mut words = vec![0u16; layout.register_count as usize];
    let temperature_word = (temperature * layout.scale).round() as i16 as u16;
    let humidity_word = (humidity * layout.scale).round() as u16;

    let slot = |index: u16| {
        if (index as usize) < words.len() {
            Ok(index as usize)
        } else {
            Err(DecodeError::Malformed(format!(
                "register {} outside the block",
                index
            )))
        }
    };
    let t = slot(layout.temperature_index)?;
    let h = slot(layout.humidity_index)?;
    words[t] = temperature_word;
    words[h] = humidity_word;
    Ok(words)
}

#[derive(Debug, Deserialize)]
struct RawComponent {
    id: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(alias = "temperature")]
    value: f64,
    #[serde(default)]
    kind: Option<ComponentKind>,
}

/// Guess the component kind from a sensor label
pub fn infer_component_kind(label: &str) -> ComponentKind {
    let label = label.to_ascii_uppercase();
    const DISK_MARKERS: [&str; 5] = ["HDD", "SSD", "NVME", "DISK", "DRIVE"];
    const CPU_MARKERS: [&str; 7] = ["CPU", "CORE", "PACKAGE", "TCTL", "TDIE", "K10TEMP", "CORETEMP"];

    if DISK_MARKERS.iter().any(|m| label.contains(m)) {
        ComponentKind::Disk
    } else if CPU_MARKERS.iter().any(|m| label.contains(m)) {
        ComponentKind::Cpu
    } else {
        ComponentKind::Other
    }
}

/// Decode a host-metrics payload into a live [`MetricsSnapshot`]
///
/// The snapshot is all-or-nothing: one bad component rejects the payload.
pub fn decode_metrics(payload: &[u8], timestamp: DateTime<Utc>) -> Result<MetricsSnapshot, DecodeError> {
    let raw: Vec<RawComponent> = serde_json::from_slice(payload)
        .map_err(|e| DecodeError::Malformed(format!("invalid host metrics JSON: {}", e)))?;

    if raw.is_empty() {
        return Err(DecodeError::Malformed("no components in payload".to_string()));
    }

    let mut components: Vec<ComponentTemperature> = Vec::with_capacity(raw.len());
    for entry in raw {
        if entry.id.trim().is_empty() {
            return Err(DecodeError::Malformed("component with an empty id".to_string()));
        }
        if components.iter().any(|c| c.component_id == entry.id) {
            return Err(DecodeError::Malformed(format!(
                "duplicate component id '{}'",
                entry.id
            )));
        }
        validate_component_temperature(&entry.id, entry.value)?;

        let label = entry.label.unwrap_or_else(|| entry.id.clone());
        let kind = entry.kind.unwrap_or_else(|| infer_component_kind(&label));
        components.push(ComponentTemperature {
            component_id: entry.id,
            label,
            temperature: entry.value,
            kind,
        });
    }

    Ok(MetricsSnapshot {
        timestamp,
        components,
        source: ReadingSource::Live,
    })
}
