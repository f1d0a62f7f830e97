use serde::{Deserialize, Serialize};
use thiserror::Error;

/// BCM-style GPIO number.
pub type Pin = u8;

/// Callback invoked from the edge-notification context.
pub type EdgeHandler = Box<dyn Fn() + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HalError {
    #[error("pin {pin} assigned to both {first} and {second}")]
    DuplicatePin {
        pin: Pin,
        first: &'static str,
        second: &'static str,
    },
    #[error("pin {pin} is outside the supported range 0..={max}")]
    InvalidPin { pin: Pin, max: Pin },
    #[error("edge callback already registered on pin {pin}")]
    CallbackInUse { pin: Pin },
}

/// Wiring of the H-bridge and tachometer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinMap {
    pub master: Pin,
    pub dir_a: Pin,
    pub dir_b: Pin,
    pub speed: Pin,
    pub sensor: Pin,
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            master: 17,
            dir_a: 27,
            dir_b: 22,
            speed: 18,
            sensor: 23,
        }
    }
}

impl PinMap {
    pub const MAX_PIN: Pin = 53;

    fn named(&self) -> [(&'static str, Pin); 5] {
        [
            ("master", self.master),
            ("dir_a", self.dir_a),
            ("dir_b", self.dir_b),
            ("speed", self.speed),
            ("sensor", self.sensor),
        ]
    }

    pub fn validate(&self) -> Result<(), HalError> {
        let named = self.named();
        for (i, (name, pin)) in named.iter().enumerate() {
            if *pin > Self::MAX_PIN {
                return Err(HalError::InvalidPin {
                    pin: *pin,
                    max: Self::MAX_PIN,
                });
            }
            if let Some((other, _)) = named[..i].iter().find(|(_, p)| p == pin) {
                return Err(HalError::DuplicatePin {
                    pin: *pin,
                    first: other,
                    second: name,
                });
            }
        }
        Ok(())
    }
}

/// Narrow hardware surface consumed by the controller.
///
/// Runtime writes are infallible; only `configure` and callback registration
/// can fail, and only at startup.
pub trait MotorIO: Send {
    fn configure(&mut self, pins: &PinMap, glitch_filter_us: u32) -> Result<(), HalError>;
    fn write_digital(&mut self, pin: Pin, level: Level);
    /// `duty` is a fraction in `0.0..=1.0`.
    fn set_pwm(&mut self, pin: Pin, frequency_hz: u32, duty: f64);
    fn read_digital(&self, pin: Pin) -> Level;
    fn on_rising_edge(&mut self, pin: Pin, handler: EdgeHandler) -> Result<(), HalError>;
    /// Monotonic microseconds.
    fn now_micros(&self) -> u64;

    /// Advance backend-side dynamics. Real hardware ignores this.
    fn step(&mut self, _dt_s: f64) {}
}
