//! Tuning profile for the controller.
//!
//! Every section has defaults, so a profile file only needs the values it
//! changes.

use crate::controller::ControllerConfig;
use crate::hal::{HalError, PinMap};
use crate::hal_sim::PlantModel;
use crate::safety::SafetyLimits;
use crate::strategy::Correction;
use crate::tachometer::TachometerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

const MAX_TICK_PERIOD_MS: u64 = 3_600_000;

/// Errors that can occur while loading a profile
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Failed to read profile file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse profile: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pin assignment: {0}")]
    Pins(#[from] HalError),

    #[error("Invalid profile value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlProfile {
    /// GPIO assignment
    pub pins: PinMap,
    /// PWM carrier frequency for the speed output
    pub pwm_frequency_hz: u32,
    /// Control tick period; also the tachometer counting window
    pub tick_period_ms: u64,
    pub tachometer: TachometerConfig,
    pub controller: ControllerConfig,
    /// Closed-loop correction strategy
    pub strategy: Correction,
    pub limits: SafetyLimits,
    /// Plant used by the simulated rig
    pub plant: PlantModel,
}

impl Default for ControlProfile {
    fn default() -> Self {
        Self {
            pins: PinMap::default(),
            pwm_frequency_hz: 1000,
            tick_period_ms: 1000,
            tachometer: TachometerConfig::default(),
            controller: ControllerConfig::default(),
            strategy: Correction::default(),
            limits: SafetyLimits::default(),
            plant: PlantModel::default(),
        }
    }
}

impl ControlProfile {
    pub fn from_json_file(path: &Path) -> Result<Self, ProfileError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ProfileError> {
        let profile: Self = serde_json::from_str(text)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        self.pins.validate()?;

        let invalid = |msg: &str| Err(ProfileError::Invalid(msg.to_string()));
        if self.tick_period_ms == 0 {
            return invalid("tick_period_ms must be positive");
        }
        if self.tick_period_ms > MAX_TICK_PERIOD_MS {
            return invalid("tick_period_ms must be at most one hour");
        }
        if self.pwm_frequency_hz == 0 {
            return invalid("pwm_frequency_hz must be positive");
        }
        let tach = &self.tachometer;
        if !(tach.pulses_per_revolution > 0.0) {
            return invalid("tachometer.pulses_per_revolution must be positive");
        }
        if !(0.0..1.0).contains(&tach.smoothing) {
            return invalid("tachometer.smoothing must be in [0, 1)");
        }
        if !(tach.jump_factor > 1.0) {
            return invalid("tachometer.jump_factor must exceed 1");
        }
        if self.limits.max_power_percent > 100 {
            return invalid("limits.max_power_percent must be at most 100");
        }
        if self.limits.max_step_percent == 0 {
            return invalid("limits.max_step_percent must be positive");
        }
        if self.controller.kickstart_percent > self.limits.max_power_percent {
            return invalid("controller.kickstart_percent exceeds limits.max_power_percent");
        }
        if !(self.plant.time_constant_s > 0.0) {
            return invalid("plant.time_constant_s must be positive");
        }
        Ok(())
    }
}
