use crate::command::ControlCommand;
use crate::driver::MotorDriver;
use crate::hal::{Level, MotorIO};
use crate::safety::{PowerClamp, Ramp, SafetyLimits, Setpoint};
use crate::strategy::{Correction, CorrectionStrategy};
use log::{debug, info};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlMode {
    #[default]
    Manual,
    Automatic,
}

impl ControlMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlMode::Manual => "manual",
            ControlMode::Automatic => "automatic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Coast,
    Forward,
    Reverse,
}

impl Direction {
    /// Levels for the (A, B) bridge inputs. Both-high is never produced.
    pub fn levels(self) -> (Level, Level) {
        match self {
            Direction::Coast => (Level::Low, Level::Low),
            Direction::Forward => (Level::Low, Level::High),
            Direction::Reverse => (Level::High, Level::Low),
        }
    }

    pub fn from_levels(a: Level, b: Level) -> Self {
        match (a, b) {
            (Level::Low, Level::High) => Direction::Forward,
            (Level::High, Level::Low) => Direction::Reverse,
            _ => Direction::Coast,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorState {
    pub power_percent: u8,
    pub direction: Direction,
    pub master_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerState {
    pub mode: ControlMode,
    pub target_rpm: u32,
    pub accumulated_error: f64,
    pub previous_error: f64,
    pub manual_power: u8,
}

impl ControllerState {
    fn clear_accumulators(&mut self) {
        self.accumulated_error = 0.0;
        self.previous_error = 0.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub manual_step_percent: u8,
    pub target_step_rpm: u32,
    /// Target used when automatic mode is entered with no target set.
    pub default_target_rpm: u32,
    /// Smoothed speed below which the rotor is treated as stalled.
    pub stall_threshold_rpm: f64,
    /// Power applied once to break static friction from a stall.
    pub kickstart_percent: u8,
    /// Manual power above which the motor is considered driven.
    pub motion_threshold_percent: u8,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            manual_step_percent: 10,
            target_step_rpm: 100,
            default_target_rpm: 500,
            stall_threshold_rpm: 30.0,
            kickstart_percent: 25,
            motion_threshold_percent: 10,
        }
    }
}

/// What the closed loop did on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Not in automatic mode or master power is off.
    Idle,
    /// Target is zero; power forced off.
    Stopped,
    Kickstart { power: u8 },
    /// Still stalled after the kick; power held and integral frozen.
    StallHold { power: u8 },
    Adjusted {
        delta: i32,
        power: u8,
        clamp: Option<PowerClamp>,
    },
}

pub struct SpeedController {
    config: ControllerConfig,
    limits: SafetyLimits,
    strategy: Correction,
    motor: MotorState,
    state: ControllerState,
    kick_armed: bool,
}

impl SpeedController {
    pub fn new(config: ControllerConfig, limits: SafetyLimits, strategy: Correction) -> Self {
        Self {
            config,
            limits,
            strategy,
            motor: MotorState::default(),
            state: ControllerState::default(),
            kick_armed: true,
        }
    }

    pub fn motor(&self) -> &MotorState {
        &self.motor
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn mode(&self) -> ControlMode {
        self.state.mode
    }

    pub fn strategy(&self) -> &Correction {
        &self.strategy
    }

    /// Whether a zero tachometer reading would contradict what the motor is told to do.
    pub fn motion_demanded(&self) -> bool {
        self.motor.master_enabled
            && (self.motor.power_percent > self.config.motion_threshold_percent
                || (self.state.mode == ControlMode::Automatic && self.state.target_rpm > 0))
    }

    pub fn apply<IO: MotorIO>(&mut self, command: ControlCommand, driver: &mut MotorDriver<IO>) {
        match command {
            ControlCommand::Start => {
                driver.set_master(true);
                self.motor.master_enabled = true;
                self.state.clear_accumulators();
                self.kick_armed = true;
                match self.state.mode {
                    ControlMode::Manual => driver.set_power(self.motor.power_percent),
                    ControlMode::Automatic => self.enter_automatic(driver, true),
                }
                info!("motor started in {} mode", self.state.mode.as_str());
            }
            ControlCommand::Stop => self.stop(driver),
            ControlCommand::SetDirection(direction) => {
                driver.set_direction(direction);
                self.motor.direction = direction;
                debug!("direction set to {direction:?}");
            }
            ControlCommand::Faster => self.step_manual(driver, true),
            ControlCommand::Slower => self.step_manual(driver, false),
            ControlCommand::SwitchToAutomatic => {
                self.enter_automatic(driver, true);
                info!("switched to automatic, target {} rpm", self.state.target_rpm);
            }
            ControlCommand::SwitchToManual => {
                self.state.mode = ControlMode::Manual;
                self.state.manual_power = self.motor.power_percent;
                info!("switched to manual at {}%", self.motor.power_percent);
            }
            ControlCommand::IncrementTarget => {
                if self.state.mode == ControlMode::Automatic {
                    let raised = self
                        .state
                        .target_rpm
                        .saturating_add(self.config.target_step_rpm);
                    self.state.target_rpm = self.limits.clamp_target(raised);
                }
                debug!("target rpm {}", self.state.target_rpm);
            }
            ControlCommand::DecrementTarget => {
                if self.state.mode == ControlMode::Automatic {
                    self.state.target_rpm = self
                        .state
                        .target_rpm
                        .saturating_sub(self.config.target_step_rpm);
                }
                debug!("target rpm {}", self.state.target_rpm);
            }
        }
    }

    pub fn set_target_rpm<IO: MotorIO>(&mut self, rpm: u32, driver: &mut MotorDriver<IO>) {
        self.state.target_rpm = self.limits.clamp_target(rpm);
        self.kick_armed = true;
        if self.state.mode != ControlMode::Automatic {
            self.enter_automatic(driver, false);
        }
        info!("target set to {} rpm", self.state.target_rpm);
    }

    /// Runs the closed loop once against the smoothed speed.
    pub fn correct<IO: MotorIO>(
        &mut self,
        measured_rpm: f64,
        driver: &mut MotorDriver<IO>,
    ) -> TickAction {
        if self.state.mode != ControlMode::Automatic || !self.motor.master_enabled {
            return TickAction::Idle;
        }

        if self.state.target_rpm == 0 {
            self.state.clear_accumulators();
            self.apply_power(0, driver);
            return TickAction::Stopped;
        }

        let error = f64::from(self.state.target_rpm) - measured_rpm;

        if self.is_stalled(measured_rpm) {
            let kick = self
                .config
                .kickstart_percent
                .min(self.limits.max_power_percent);
            if self.kick_armed {
                self.kick_armed = false;
                self.state.previous_error = error;
                if self.motor.power_percent < kick {
                    self.apply_power(kick, driver);
                }
                return TickAction::Kickstart {
                    power: self.motor.power_percent,
                };
            }
            // Below the kick level the loop is allowed to climb on its own.
            if self.motor.power_percent >= kick {
                self.state.previous_error = error;
                return TickAction::StallHold {
                    power: self.motor.power_percent,
                };
            }
        }

        let current = self.motor.power_percent;
        let adjustment = self
            .strategy
            .compute_power_adjustment(error, &mut self.state, current);
        self.state.previous_error = error;

        let adjustment = adjustment.round().clamp(-100.0, 100.0) as i32;
        let requested = i32::from(current) + adjustment;
        let (setpoint, clamp) = Setpoint::new(requested).clamp(&self.limits, current, Ramp::Limited);
        let power = setpoint.percent();
        self.apply_power(power, driver);

        TickAction::Adjusted {
            delta: i32::from(power) - i32::from(current),
            power,
            clamp,
        }
    }

    /// Actuator off and state zeroed. Mode is kept.
    pub fn stop<IO: MotorIO>(&mut self, driver: &mut MotorDriver<IO>) {
        driver.all_off();
        self.motor = MotorState::default();
        self.state = ControllerState {
            mode: self.state.mode,
            ..ControllerState::default()
        };
        self.kick_armed = true;
    }

    /// The rotor counts as stalled below the configured threshold, or half
    /// the target when that is lower. Targets at or under the threshold
    /// never trigger the kick.
    fn is_stalled(&self, measured_rpm: f64) -> bool {
        let threshold = self.config.stall_threshold_rpm;
        let target = f64::from(self.state.target_rpm);
        self.config.kickstart_percent > 0
            && target > threshold
            && measured_rpm < threshold.min(target / 2.0)
    }

    pub fn force_mode(&mut self, mode: ControlMode) {
        self.state.mode = mode;
    }

    fn enter_automatic<IO: MotorIO>(&mut self, driver: &mut MotorDriver<IO>, default_target: bool) {
        self.state.mode = ControlMode::Automatic;
        driver.set_master(true);
        self.motor.master_enabled = true;
        if driver.direction() == Direction::Coast {
            driver.set_direction(Direction::Forward);
        }
        self.motor.direction = driver.direction();
        if default_target && self.state.target_rpm == 0 {
            self.state.target_rpm = self.limits.clamp_target(self.config.default_target_rpm);
        }
        self.state.clear_accumulators();
        self.kick_armed = true;
    }

    fn step_manual<IO: MotorIO>(&mut self, driver: &mut MotorDriver<IO>, faster: bool) {
        if self.state.mode != ControlMode::Manual {
            return;
        }
        let step = i32::from(self.config.manual_step_percent);
        let current = self.motor.power_percent;
        let requested = if faster {
            i32::from(current) + step
        } else {
            i32::from(current) - step
        };
        let (setpoint, _) = Setpoint::new(requested).clamp(&self.limits, current, Ramp::Immediate);
        self.apply_power(setpoint.percent(), driver);
        self.state.manual_power = self.motor.power_percent;
        debug!("manual power {}%", self.motor.power_percent);
    }

    fn apply_power<IO: MotorIO>(&mut self, percent: u8, driver: &mut MotorDriver<IO>) {
        self.motor.power_percent = percent;
        driver.set_power(percent);
    }
}
