// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Synthetic readings
//!
//! Substitute readings published while a feed is unavailable. Every value
//! produced here carries [`ReadingSource::Synthetic`].
//!
//! ```text
//! value = base + amplitude · sin(2π · phase / 24) + U(-jitter, +jitter)
//! ```
//!
//! `base` is the last known-good live reading, or the configured defaults if
//! the feed never produced one. When the known-good reading changes the
//! phase restarts at zero, so the first synthetic sample continues from the
//! live value instead of jumping somewhere along the daily curve.

use std::f64::consts::TAU;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::decoder::{validate_component_temperature, validate_sensor_values};
use super::{ComponentTemperature, MetricsSnapshot, ReadingSource, SensorReading};
use crate::config::{SyntheticMetricsConfig, SyntheticSensorConfig};

/// Samples per simulated day
pub const DIURNAL_CYCLE: u32 = 24;

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Phase-driven daily curve with bounded jitter
#[derive(Debug)]
struct DiurnalWave {
    rng: StdRng,
    phase: u32,
}

impl DiurnalWave {
    fn new(seed: Option<u64>) -> Self {
        Self {
            rng: make_rng(seed),
            phase: 0,
        }
    }

    fn restart(&mut self) {
        self.phase = 0;
    }

    fn advance(&mut self) {
        self.phase = (self.phase + 1) % DIURNAL_CYCLE;
    }

    fn sample(&mut self, base: f64, amplitude: f64, jitter: f64) -> f64 {
        let diurnal = amplitude * (TAU * self.phase as f64 / DIURNAL_CYCLE as f64).sin();
        let noise = if jitter > 0.0 {
            self.rng.random_range(-jitter..=jitter)
        } else {
            0.0
        };
        round_tenth(base + diurnal + noise)
    }
}

/// Substitute temperature/humidity readings for the field-bus feed
#[derive(Debug)]
pub struct SyntheticSensorGenerator {
    config: SyntheticSensorConfig,
    wave: DiurnalWave,
    base_temperature: f64,
    base_humidity: f64,
    /// Timestamp of the known-good reading the base was taken from
    anchor: Option<DateTime<Utc>>,
}

impl SyntheticSensorGenerator {
    /// Create a generator; `config.seed` makes the output reproducible
    pub fn new(config: SyntheticSensorConfig) -> Self {
        Self {
            wave: DiurnalWave::new(config.seed),
            base_temperature: config.default_temperature,
            base_humidity: config.default_humidity,
            anchor: None,
            config,
        }
    }

    fn rebase(&mut self, last_good: Option<&SensorReading>) {
        let Some(reading) = last_good else { return };
        if reading.source != ReadingSource::Live || self.anchor == Some(reading.timestamp) {
            return;
        }
        self.base_temperature = reading.temperature;
        self.base_humidity = reading.humidity;
        self.anchor = Some(reading.timestamp);
        self.wave.restart();
    }

    /// Produce the next substitute reading
    pub fn next(&mut self, last_good: Option<&SensorReading>, timestamp: DateTime<Utc>) -> SensorReading {
        self.rebase(last_good);

        let mut temperature = self.wave.sample(
            self.base_temperature,
            self.config.temperature_amplitude,
            self.config.temperature_jitter,
        );
        let mut humidity = self.wave.sample(
            self.base_humidity,
            self.config.humidity_amplitude,
            self.config.humidity_jitter,
        );
        self.wave.advance();

        if validate_sensor_values(temperature, humidity).is_err() {
            temperature = self.base_temperature;
            humidity = self.base_humidity;
        }

        SensorReading {
            timestamp,
            temperature,
            humidity,
            source: ReadingSource::Synthetic,
        }
    }

    /// Back-fill `count` readings spaced by `step`, the last one at `end`
    ///
    /// Used to draw a plausible trend when no live history exists.
    pub fn series(&mut self, count: usize, step: chrono::Duration, end: DateTime<Utc>) -> Vec<SensorReading> {
        (0..count)
            .map(|i| {
                let steps_back = (count - 1 - i) as i32;
                self.next(None, end - step * steps_back)
            })
            .collect()
    }
}

/// Substitute component temperatures for the host-metrics feed
#[derive(Debug)]
pub struct SyntheticMetricsGenerator {
    config: SyntheticMetricsConfig,
    wave: DiurnalWave,
    base: Vec<ComponentTemperature>,
    anchor: Option<DateTime<Utc>>,
}

impl SyntheticMetricsGenerator {
    pub fn new(config: SyntheticMetricsConfig) -> Self {
        let base = config
            .components
            .iter()
            .map(|c| ComponentTemperature {
                component_id: c.id.clone(),
                label: c.label.clone(),
                temperature: c.temperature,
                kind: c.kind,
            })
            .collect();
        Self {
            wave: DiurnalWave::new(config.seed),
            base,
            anchor: None,
            config,
        }
    }

    fn rebase(&mut self, last_good: Option<&MetricsSnapshot>) {
        let Some(snapshot) = last_good else { return };
        if snapshot.source != ReadingSource::Live
            || snapshot.components.is_empty()
            || self.anchor == Some(snapshot.timestamp)
        {
            return;
        }
        self.base = snapshot.components.clone();
        self.anchor = Some(snapshot.timestamp);
        self.wave.restart();
    }

    /// Produce the next substitute snapshot, one value per known component
    pub fn next(&mut self, last_good: Option<&MetricsSnapshot>, timestamp: DateTime<Utc>) -> MetricsSnapshot {
        self.rebase(last_good);

        let amplitude = self.config.amplitude;
        let jitter = self.config.jitter;
        let mut components = Vec::with_capacity(self.base.len());
        for base in &self.base {
            let mut temperature = self.wave.sample(base.temperature, amplitude, jitter);
            if validate_component_temperature(&base.component_id, temperature).is_err() {
                temperature = base.temperature;
            }
            components.push(ComponentTemperature {
                temperature,
                ..base.clone()
            });
        }
        self.wave.advance();

        MetricsSnapshot {
            timestamp,
            components,
            source: ReadingSource::Synthetic,
        }
    }
}
