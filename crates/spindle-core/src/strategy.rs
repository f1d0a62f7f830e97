//! Closed-loop correction strategies.
//!
//! Each strategy turns the tick's speed error into a power adjustment. The
//! controller owns rate limiting, range clamping and stall handling, so
//! strategies stay small and interchangeable.

use crate::controller::ControllerState;
use serde::{Deserialize, Serialize};

pub trait CorrectionStrategy {
    /// Power change in percent for this tick, before any limiting.
    fn compute_power_adjustment(
        &self,
        error: f64,
        state: &mut ControllerState,
        power_percent: u8,
    ) -> f64;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidCorrection {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Anti-windup bound on the accumulated error.
    pub integral_limit: f64,
}

impl Default for PidCorrection {
    fn default() -> Self {
        Self {
            kp: 0.01,
            ki: 0.005,
            kd: 0.0,
            integral_limit: 50.0,
        }
    }
}

impl CorrectionStrategy for PidCorrection {
    fn compute_power_adjustment(
        &self,
        error: f64,
        state: &mut ControllerState,
        _power_percent: u8,
    ) -> f64 {
        let limit = self.integral_limit.abs();
        state.accumulated_error = (state.accumulated_error + error).clamp(-limit, limit);
        let derivative = error - state.previous_error;
        self.kp * error + self.ki * state.accumulated_error + self.kd * derivative
    }

    fn name(&self) -> &'static str {
        "pid"
    }
}

/// Bang-bang stepping with a dead zone around the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HystereticCorrection {
    pub deadband_rpm: f64,
    pub step_percent: f64,
}

impl Default for HystereticCorrection {
    fn default() -> Self {
        Self {
            deadband_rpm: 25.0,
            step_percent: 1.0,
        }
    }
}

impl CorrectionStrategy for HystereticCorrection {
    fn compute_power_adjustment(
        &self,
        error: f64,
        _state: &mut ControllerState,
        _power_percent: u8,
    ) -> f64 {
        if error > self.deadband_rpm {
            self.step_percent
        } else if error < -self.deadband_rpm {
            -self.step_percent
        } else {
            0.0
        }
    }

    fn name(&self) -> &'static str {
        "hysteretic"
    }
}

/// Open-loop power estimate from the target plus an integrating trim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedForwardCorrection {
    /// Expected steady-state speed per percent of power.
    pub rpm_per_percent: f64,
    pub trim_gain: f64,
    pub trim_limit_percent: f64,
}

impl Default for FeedForwardCorrection {
    fn default() -> Self {
        Self {
            rpm_per_percent: 20.0,
            trim_gain: 0.002,
            trim_limit_percent: 10.0,
        }
    }
}

impl CorrectionStrategy for FeedForwardCorrection {
    fn compute_power_adjustment(
        &self,
        error: f64,
        state: &mut ControllerState,
        power_percent: u8,
    ) -> f64 {
        let limit = self.trim_limit_percent.abs();
        state.accumulated_error =
            (state.accumulated_error + self.trim_gain * error).clamp(-limit, limit);
        let feed_forward = if self.rpm_per_percent > 0.0 {
            f64::from(state.target_rpm) / self.rpm_per_percent
        } else {
            0.0
        };
        feed_forward + state.accumulated_error - f64::from(power_percent)
    }

    fn name(&self) -> &'static str {
        "feedforward"
    }
}

/// Strategy selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Correction {
    Pid(PidCorrection),
    Hysteretic(HystereticCorrection),
    FeedForward(FeedForwardCorrection),
}

impl Default for Correction {
    fn default() -> Self {
        Correction::Pid(PidCorrection::default())
    }
}

impl Correction {
    /// Default-tuned strategy by name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pid" => Some(Correction::Pid(PidCorrection::default())),
            "hysteretic" => Some(Correction::Hysteretic(HystereticCorrection::default())),
            "feedforward" | "feed_forward" => {
                Some(Correction::FeedForward(FeedForwardCorrection::default()))
            }
            _ => None,
        }
    }
}

impl CorrectionStrategy for Correction {
    fn compute_power_adjustment(
        &self,
        error: f64,
        state: &mut ControllerState,
        power_percent: u8,
    ) -> f64 {
        match self {
            Correction::Pid(s) => s.compute_power_adjustment(error, state, power_percent),
            Correction::Hysteretic(s) => s.compute_power_adjustment(error, state, power_percent),
            Correction::FeedForward(s) => s.compute_power_adjustment(error, state, power_percent),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Correction::Pid(s) => s.name(),
            Correction::Hysteretic(s) => s.name(),
            Correction::FeedForward(s) => s.name(),
        }
    }
}
