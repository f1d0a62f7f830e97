use crate::controller::Direction;
use crate::hal::{Level, MotorIO, PinMap};

/// H-bridge view of the raw pin interface.
pub struct MotorDriver<IO: MotorIO> {
    io: IO,
    pins: PinMap,
    pwm_frequency_hz: u32,
}

impl<IO: MotorIO> MotorDriver<IO> {
    pub fn new(io: IO, pins: PinMap, pwm_frequency_hz: u32) -> Self {
        Self {
            io,
            pins,
            pwm_frequency_hz,
        }
    }

    pub fn pins(&self) -> &PinMap {
        &self.pins
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    pub fn set_master(&mut self, enabled: bool) {
        let level = if enabled { Level::High } else { Level::Low };
        self.io.write_digital(self.pins.master, level);
    }

    pub fn set_direction(&mut self, direction: Direction) {
        let (a, b) = direction.levels();
        self.io.write_digital(self.pins.dir_a, a);
        self.io.write_digital(self.pins.dir_b, b);
    }

    /// Direction as currently driven on the bridge inputs.
    pub fn direction(&self) -> Direction {
        Direction::from_levels(
            self.io.read_digital(self.pins.dir_a),
            self.io.read_digital(self.pins.dir_b),
        )
    }

    pub fn set_power(&mut self, percent: u8) {
        let duty = f64::from(percent.min(100)) / 100.0;
        self.io
            .set_pwm(self.pins.speed, self.pwm_frequency_hz, duty);
    }

    /// Zero duty, bridge coasting, master released.
    pub fn all_off(&mut self) {
        self.set_power(0);
        self.set_direction(Direction::Coast);
        self.set_master(false);
    }
}
