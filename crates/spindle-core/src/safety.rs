use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy)]
pub struct Unvalidated;

#[derive(Debug, Clone, Copy)]
pub struct Validated;

/// Motor power request in percent. Only a validated setpoint reaches the PWM.
#[derive(Debug, Clone, Copy)]
pub struct Setpoint<State = Unvalidated> {
    value: i32,
    _state: PhantomData<State>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyLimits {
    pub max_power_percent: u8,
    /// Largest power change the closed loop may make in one tick.
    pub max_step_percent: u8,
    pub max_target_rpm: u32,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_power_percent: 100,
            max_step_percent: 5,
            max_target_rpm: 12_000,
        }
    }
}

impl SafetyLimits {
    pub fn clamp_target(&self, requested: u32) -> u32 {
        requested.min(self.max_target_rpm)
    }
}

/// Which limit shaped a setpoint on its way to the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerClamp {
    RateLimited { requested_delta: i32, limit: i32 },
    BelowMinimum { requested: i32 },
    AboveMaximum { requested: i32, limit: i32 },
}

/// Whether the per-tick step limit applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ramp {
    Limited,
    Immediate,
}

impl Setpoint<Unvalidated> {
    pub fn new(value: i32) -> Self {
        Self {
            value,
            _state: PhantomData,
        }
    }

    /// Brings the request inside the limits instead of rejecting it.
    ///
    /// Returns the last clamp applied, if any.
    pub fn clamp(
        self,
        limits: &SafetyLimits,
        current_percent: u8,
        ramp: Ramp,
    ) -> (Setpoint<Validated>, Option<PowerClamp>) {
        let mut value = self.value;
        let mut clamp = None;

        if ramp == Ramp::Limited {
            let current = i32::from(current_percent);
            let limit = i32::from(limits.max_step_percent);
            let delta = value.saturating_sub(current);
            if delta.saturating_abs() > limit {
                value = current + delta.signum() * limit;
                clamp = Some(PowerClamp::RateLimited {
                    requested_delta: delta,
                    limit,
                });
            }
        }

        let max = i32::from(limits.max_power_percent.min(100));
        if value < 0 {
            clamp = Some(PowerClamp::BelowMinimum { requested: value });
            value = 0;
        } else if value > max {
            clamp = Some(PowerClamp::AboveMaximum {
                requested: value,
                limit: max,
            });
            value = max;
        }

        (
            Setpoint {
                value,
                _state: PhantomData,
            },
            clamp,
        )
    }
}

impl Setpoint<Validated> {
    pub fn percent(&self) -> u8 {
        // Clamped into 0..=100 during validation.
        self.value as u8
    }
}
