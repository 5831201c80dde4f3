// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-labmonitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Laboratory environment thresholds
//!
//! Used by [`crate::acquisition::monitoring`] to label table rows.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Temperature limits applied to environment readings (°C)
///
/// A reading strictly above a limit triggers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentThresholds {
    /// Cooling runs above this temperature, standby otherwise
    pub cooling_above: f64,

    /// Status becomes `Caution` above this temperature
    pub caution_above: f64,

    /// Status becomes `Warning` above this temperature
    pub warning_above: f64,
}

impl Default for EnvironmentThresholds {
    fn default() -> Self {
        Self {
            cooling_above: 25.0,
            caution_above: 25.0,
            warning_above: 26.0,
        }
    }
}

impl EnvironmentThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("environment.cooling_above", self.cooling_above),
            ("environment.caution_above", self.caution_above),
            ("environment.warning_above", self.warning_above),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: "must be a finite temperature".to_string(),
                });
            }
        }
        if self.caution_above > self.warning_above {
            return Err(ConfigError::Invalid {
                field: "environment.warning_above".to_string(),
                reason: format!(
                    "{} is below caution_above ({})",
                    self.warning_above, self.caution_above
                ),
            });
        }
        Ok(())
    }
}
