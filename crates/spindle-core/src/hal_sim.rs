use crate::hal::{EdgeHandler, HalError, Level, MotorIO, Pin, PinMap};
use crate::timebase::{SimClock, TimeBase};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// First-order DC motor response with a slotted/taped tachometer disc.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantModel {
    /// Steady-state speed per percent of duty.
    pub rpm_per_percent: f64,
    pub time_constant_s: f64,
    /// Edges produced by the sensor per shaft revolution.
    pub pulses_per_revolution: f64,
}

impl Default for PlantModel {
    fn default() -> Self {
        Self {
            rpm_per_percent: 20.0,
            time_constant_s: 0.4,
            pulses_per_revolution: 3.0,
        }
    }
}

/// Simulated H-bridge, motor and tachometer behind [`MotorIO`].
pub struct SimulatedRig {
    clock: SimClock,
    plant: PlantModel,
    pins: Option<PinMap>,
    levels: HashMap<Pin, Level>,
    duty: HashMap<Pin, f64>,
    pwm_frequency_hz: HashMap<Pin, u32>,
    handlers: HashMap<Pin, EdgeHandler>,
    glitch_filter_us: u32,
    speed_rpm: f64,
    pulse_phase: f64,
    last_edge_us: Option<u64>,
    sensor_connected: bool,
    edges_filtered: u64,
}

impl SimulatedRig {
    /// Rig running on the process monotonic clock.
    pub fn new(timebase: TimeBase, plant: PlantModel) -> Self {
        Self::with_clock(SimClock::Wall(timebase), plant)
    }

    /// Rig whose clock only moves through [`MotorIO::step`].
    pub fn manual(plant: PlantModel) -> Self {
        Self::with_clock(SimClock::Manual { now_us: 0 }, plant)
    }

    fn with_clock(clock: SimClock, plant: PlantModel) -> Self {
        Self {
            clock,
            plant,
            pins: None,
            levels: HashMap::new(),
            duty: HashMap::new(),
            pwm_frequency_hz: HashMap::new(),
            handlers: HashMap::new(),
            glitch_filter_us: 0,
            speed_rpm: 0.0,
            pulse_phase: 0.0,
            last_edge_us: None,
            sensor_connected: true,
            edges_filtered: 0,
        }
    }

    pub fn speed_rpm(&self) -> f64 {
        self.speed_rpm
    }

    pub fn duty(&self, pin: Pin) -> f64 {
        self.duty.get(&pin).copied().unwrap_or(0.0)
    }

    pub fn pwm_frequency_hz(&self, pin: Pin) -> u32 {
        self.pwm_frequency_hz.get(&pin).copied().unwrap_or(0)
    }

    pub fn edges_filtered(&self) -> u64 {
        self.edges_filtered
    }

    /// A disconnected sensor stops producing edges while the shaft keeps turning.
    pub fn set_sensor_connected(&mut self, connected: bool) {
        self.sensor_connected = connected;
    }

    /// Fires `count` spurious edges at the current instant, as electrical noise would.
    pub fn inject_noise(&mut self, count: u32) {
        let Some(pins) = self.pins else {
            return;
        };
        if let Some(handler) = self.handlers.get(&pins.sensor) {
            for _ in 0..count {
                handler();
            }
        }
    }

    fn drive_percent(&self) -> f64 {
        let Some(pins) = self.pins else {
            return 0.0;
        };
        let level = |pin: Pin| self.levels.get(&pin).copied().unwrap_or_default();
        let master = level(pins.master).is_high();
        let energized = level(pins.dir_a) != level(pins.dir_b);
        if master && energized {
            self.duty(pins.speed).clamp(0.0, 1.0) * 100.0
        } else {
            0.0
        }
    }

    fn emit_edge(&mut self, at_us: u64) {
        let Some(pins) = self.pins else {
            return;
        };
        if !self.sensor_connected {
            return;
        }
        if let Some(last) = self.last_edge_us {
            if at_us.saturating_sub(last) < u64::from(self.glitch_filter_us) {
                self.edges_filtered += 1;
                return;
            }
        }
        self.last_edge_us = Some(at_us);
        if let Some(handler) = self.handlers.get(&pins.sensor) {
            handler();
        }
    }
}

impl MotorIO for SimulatedRig {
    fn configure(&mut self, pins: &PinMap, glitch_filter_us: u32) -> Result<(), HalError> {
        pins.validate()?;
        for pin in [pins.master, pins.dir_a, pins.dir_b] {
            self.levels.insert(pin, Level::Low);
        }
        self.duty.insert(pins.speed, 0.0);
        // Sensor input is pulled up.
        self.levels.insert(pins.sensor, Level::High);
        self.glitch_filter_us = glitch_filter_us;
        self.pins = Some(*pins);
        Ok(())
    }

    fn write_digital(&mut self, pin: Pin, level: Level) {
        self.levels.insert(pin, level);
    }

    fn set_pwm(&mut self, pin: Pin, frequency_hz: u32, duty: f64) {
        self.pwm_frequency_hz.insert(pin, frequency_hz);
        self.duty.insert(pin, duty.clamp(0.0, 1.0));
    }

    fn read_digital(&self, pin: Pin) -> Level {
        self.levels.get(&pin).copied().unwrap_or_default()
    }

    fn on_rising_edge(&mut self, pin: Pin, handler: EdgeHandler) -> Result<(), HalError> {
        if self.handlers.contains_key(&pin) {
            return Err(HalError::CallbackInUse { pin });
        }
        self.handlers.insert(pin, handler);
        Ok(())
    }

    fn now_micros(&self) -> u64 {
        self.clock.now_us()
    }

    fn step(&mut self, dt_s: f64) {
        if !(dt_s > 0.0) {
            return;
        }
        self.clock.advance(dt_s);

        let target_rpm = self.drive_percent() * self.plant.rpm_per_percent;
        let alpha = 1.0 - (-dt_s / self.plant.time_constant_s.max(1e-6)).exp();
        self.speed_rpm += (target_rpm - self.speed_rpm) * alpha;
        if self.speed_rpm < 0.0 {
            self.speed_rpm = 0.0;
        }

        self.pulse_phase += self.speed_rpm / 60.0 * self.plant.pulses_per_revolution * dt_s;
        let edges = self.pulse_phase.floor() as u64;
        if edges == 0 {
            return;
        }
        self.pulse_phase -= edges as f64;

        // Spread edges across the step so the glitch filter sees real spacing.
        let end_us = self.clock.now_us();
        let span_us = (dt_s * 1_000_000.0) as u64;
        let start_us = end_us.saturating_sub(span_us);
        for k in 1..=edges {
            self.emit_edge(start_us + span_us * k / edges);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn rig_with_counter() -> (SimulatedRig, Arc<AtomicU32>, PinMap) {
        let pins = PinMap::default();
        let mut rig = SimulatedRig::manual(PlantModel::default());
        rig.configure(&pins, 100).unwrap();
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        rig.on_rising_edge(
            pins.sensor,
            Box::new(move || {
                c.fetch_add(1, Ordering::Relaxed);
            }),
        )
        .unwrap();
        (rig, count, pins)
    }

    fn energize(rig: &mut SimulatedRig, pins: &PinMap, duty: f64) {
        rig.write_digital(pins.master, Level::High);
        rig.write_digital(pins.dir_a, Level::Low);
        rig.write_digital(pins.dir_b, Level::High);
        rig.set_pwm(pins.speed, 1000, duty);
    }

    #[test]
    fn motor_stays_idle_without_master_enable() {
        let (mut rig, count, pins) = rig_with_counter();
        rig.set_pwm(pins.speed, 1000, 0.5);
        rig.write_digital(pins.dir_b, Level::High);
        for _ in 0..100 {
            rig.step(0.01);
        }
        assert_eq!(rig.speed_rpm(), 0.0);
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn settles_to_gain_times_duty() {
        let (mut rig, count, pins) = rig_with_counter();
        energize(&mut rig, &pins, 0.5);
        for _ in 0..500 {
            rig.step(0.01);
        }
        assert!((rig.speed_rpm() - 1000.0).abs() < 1.0);
        assert!(count.load(Ordering::Relaxed) > 200);
        assert_eq!(rig.now_micros(), 5_000_000);
    }

    #[test]
    fn coast_direction_cuts_drive() {
        let (mut rig, _count, pins) = rig_with_counter();
        energize(&mut rig, &pins, 1.0);
        rig.write_digital(pins.dir_b, Level::Low);
        for _ in 0..100 {
            rig.step(0.01);
        }
        assert_eq!(rig.speed_rpm(), 0.0);
    }

    #[test]
    fn disconnected_sensor_produces_no_edges() {
        let (mut rig, count, pins) = rig_with_counter();
        energize(&mut rig, &pins, 0.5);
        rig.set_sensor_connected(false);
        for _ in 0..200 {
            rig.step(0.01);
        }
        assert!(rig.speed_rpm() > 900.0);
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn glitch_filter_drops_edges_closer_than_its_width() {
        // 2000 rpm at 600 edges/rev is one edge every 50 us.
        let plant = PlantModel {
            pulses_per_revolution: 600.0,
            ..PlantModel::default()
        };
        let run = |glitch_us: u32| {
            let pins = PinMap::default();
            let mut rig = SimulatedRig::manual(plant);
            rig.configure(&pins, glitch_us).unwrap();
            let count = Arc::new(AtomicU32::new(0));
            let c = Arc::clone(&count);
            rig.on_rising_edge(
                pins.sensor,
                Box::new(move || {
                    c.fetch_add(1, Ordering::Relaxed);
                }),
            )
            .unwrap();
            energize(&mut rig, &pins, 1.0);
            for _ in 0..400 {
                rig.step(0.01);
            }
            count.store(0, Ordering::Relaxed);
            let filtered_before = rig.edges_filtered();
            for _ in 0..100 {
                rig.step(0.01);
            }
            (
                count.load(Ordering::Relaxed),
                rig.edges_filtered() - filtered_before,
            )
        };

        let (unfiltered, none_dropped) = run(0);
        assert_eq!(none_dropped, 0);
        assert!(unfiltered > 19_000, "edges {unfiltered}");

        let (passed, dropped) = run(100);
        assert!(passed <= 10_100, "passed {passed}");
        assert!(dropped > 9_000, "dropped {dropped}");
        assert_eq!(u64::from(passed) + dropped, u64::from(unfiltered));
    }

    #[test]
    fn second_callback_on_same_pin_is_rejected() {
        let (mut rig, _count, pins) = rig_with_counter();
        let res = rig.on_rising_edge(pins.sensor, Box::new(|| {}));
        assert_eq!(res, Err(HalError::CallbackInUse { pin: pins.sensor }));
    }
}
