use crate::command::{Command, ControlCommand};
use crate::controller::{ControlMode, ControllerState, MotorState, SpeedController, TickAction};
use crate::driver::MotorDriver;
use crate::hal::{HalError, MotorIO};
use crate::parser::CommandParser;
use crate::profile::ControlProfile;
use crate::shutdown::ShutdownReason;
use crate::strategy::CorrectionStrategy;
use crate::tachometer::{Tachometer, TachometerSample};
use crate::tags::{self, Tag};
use log::{debug, log_enabled, Level};

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct ExecutionStats {
    pub ticks_executed: u64,
    pub readings_rejected: u64,
    pub commands_executed: u64,
    pub all_stops: u64,
    pub max_tick_lateness_us: u64,
}

/// Outcome of one control tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickReport {
    pub timestamp_us: u64,
    pub elapsed_s: f64,
    pub lateness_us: u64,
    pub sample: TachometerSample,
    pub action: TickAction,
    pub motor: MotorState,
    pub mode: ControlMode,
    pub target_rpm: u32,
}

impl TickReport {
    /// Process values published after each tick, keyed by tag.
    pub fn tagged_values(&self) -> [(Tag, f64); 5] {
        let mode = match self.mode {
            ControlMode::Manual => 0.0,
            ControlMode::Automatic => 1.0,
        };
        [
            (tags::SMOOTHED_RPM, self.sample.smoothed_rpm),
            (tags::TARGET_RPM, f64::from(self.target_rpm)),
            (tags::POWER_PERCENT, f64::from(self.motor.power_percent)),
            (tags::TICK_LATENESS_US, self.lateness_us as f64),
            (tags::CONTROL_MODE, mode),
        ]
    }
}

/// Everything the control side owns: actuator, estimator, parser and loop timing.
pub struct ControllerContext<IO: MotorIO> {
    pub(crate) driver: MotorDriver<IO>,
    pub(crate) controller: SpeedController,
    pub(crate) tachometer: Tachometer,
    pub(crate) parser: CommandParser,
    pub(crate) stats: ExecutionStats,
    tick_period_us: u64,
    last_tick_us: u64,
    last_step_us: u64,
}

impl<IO: MotorIO> ControllerContext<IO> {
    /// Configures the pins, hooks the tachometer edge handler and leaves the motor stopped.
    pub fn new(mut io: IO, profile: &ControlProfile) -> Result<Self, HalError> {
        io.configure(&profile.pins, profile.tachometer.glitch_filter_us)?;

        let tachometer = Tachometer::new(profile.tachometer);
        io.on_rising_edge(profile.pins.sensor, tachometer.counter().edge_handler())?;

        let now = io.now_micros();
        let mut ctx = Self {
            driver: MotorDriver::new(io, profile.pins, profile.pwm_frequency_hz),
            controller: SpeedController::new(profile.controller, profile.limits, profile.strategy),
            tachometer,
            parser: CommandParser::new(),
            stats: ExecutionStats::default(),
            tick_period_us: profile.tick_period_ms.max(1).saturating_mul(1_000),
            last_tick_us: now,
            last_step_us: now,
        };
        ctx.all_stop(ShutdownReason::Startup);
        Ok(ctx)
    }

    /// Steps the I/O backend by the monotonic time since the previous call.
    pub fn advance_io(&mut self) {
        let now = self.driver.io().now_micros();
        let dt_us = now.saturating_sub(self.last_step_us);
        if dt_us == 0 {
            return;
        }
        self.last_step_us = now;
        self.driver.io_mut().step(dt_us as f64 / 1_000_000.0);
    }

    /// Runs the tachometer and the closed loop if a tick period has elapsed.
    pub fn service_tick(&mut self) -> Option<TickReport> {
        let now = self.driver.io().now_micros();
        let elapsed_us = now.saturating_sub(self.last_tick_us);
        if elapsed_us < self.tick_period_us {
            return None;
        }
        self.last_tick_us = now;

        let lateness_us = elapsed_us - self.tick_period_us;
        let elapsed_s = elapsed_us as f64 / 1_000_000.0;

        let sample = self
            .tachometer
            .evaluate(elapsed_s, self.controller.motion_demanded());
        if !sample.verdict.is_accepted() {
            self.stats.readings_rejected += 1;
            debug!(
                "rejected tachometer reading {:.1} rpm ({})",
                sample.instantaneous_rpm,
                sample.verdict.as_str()
            );
        }

        let action = self
            .controller
            .correct(self.tachometer.smoothed(), &mut self.driver);

        self.stats.ticks_executed += 1;
        self.stats.max_tick_lateness_us = self.stats.max_tick_lateness_us.max(lateness_us);

        let state = self.controller.state();
        let report = TickReport {
            timestamp_us: now,
            elapsed_s,
            lateness_us,
            sample,
            action,
            motor: *self.controller.motor(),
            mode: state.mode,
            target_rpm: state.target_rpm,
        };
        if log_enabled!(Level::Debug) {
            let values: Vec<String> = report
                .tagged_values()
                .iter()
                .map(|(tag, value)| format!("{}={value:.1}", tag.key))
                .collect();
            debug!(
                "tick: pulses={} rpm={:.1} {} {:?}",
                sample.raw_pulse_count,
                sample.instantaneous_rpm,
                values.join(" "),
                action
            );
        }
        Some(report)
    }

    pub fn execute(&mut self, command: Command) {
        match command {
            Command::SetTargetRpm(rpm) => {
                self.stats.commands_executed += 1;
                self.controller.set_target_rpm(rpm, &mut self.driver);
            }
            Command::SimpleChar(c) => match ControlCommand::from_char(c) {
                Some(ControlCommand::Stop) => {
                    self.stats.commands_executed += 1;
                    self.all_stop(ShutdownReason::StopCommand);
                }
                Some(cmd) => {
                    self.stats.commands_executed += 1;
                    debug!("command {cmd:?}");
                    self.controller.apply(cmd, &mut self.driver);
                }
                None => debug!("ignoring unknown command {c:?}"),
            },
        }
    }

    /// Parses a chunk of client bytes, executing each command as soon as its
    /// byte completes it.
    ///
    /// A stop resets the parser, so commands must not be batched past it.
    /// Returns the number of commands parsed.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let mut count = 0;
        for &byte in bytes {
            for command in self.parser.push(byte).into_iter().flatten() {
                count += 1;
                self.execute(command);
            }
        }
        count
    }

    pub fn on_connect(&mut self) {
        self.controller.force_mode(ControlMode::Manual);
        self.all_stop(ShutdownReason::NewConnection);
    }

    pub fn on_disconnect(&mut self, reason: ShutdownReason) {
        self.controller.force_mode(ControlMode::Manual);
        self.all_stop(reason);
    }

    pub fn motor_state(&self) -> &MotorState {
        self.controller.motor()
    }

    pub fn controller_state(&self) -> &ControllerState {
        self.controller.state()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.controller.strategy().name()
    }

    /// Smoothed speed as published to the client.
    pub fn smoothed_rpm(&self) -> u32 {
        self.tachometer.smoothed_rpm()
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn tick_period_us(&self) -> u64 {
        self.tick_period_us
    }

    pub fn io(&self) -> &IO {
        self.driver.io()
    }

    pub fn io_mut(&mut self) -> &mut IO {
        self.driver.io_mut()
    }

    pub fn driver(&self) -> &MotorDriver<IO> {
        &self.driver
    }
}
