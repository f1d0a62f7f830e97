//! Tachometer signal conditioning.
//!
//! Edges are counted asynchronously by [`PulseCounter`]; once per control
//! tick [`Tachometer::evaluate`] turns the window's count into an RPM
//! reading, screens it for physically implausible values and folds accepted
//! readings into an exponentially weighted average.

use crate::hal::EdgeHandler;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Edge counter shared between the edge callback and the control tick.
#[derive(Debug, Clone, Default)]
pub struct PulseCounter {
    pulses: Arc<AtomicU32>,
}

impl PulseCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called from the edge context.
    pub fn record_pulse(&self) {
        self.pulses.fetch_add(1, Ordering::Release);
    }

    /// Reads and clears the count in one step.
    pub fn take(&self) -> u32 {
        self.pulses.swap(0, Ordering::AcqRel)
    }

    pub fn pending(&self) -> u32 {
        self.pulses.load(Ordering::Acquire)
    }

    pub fn edge_handler(&self) -> EdgeHandler {
        let counter = self.clone();
        Box::new(move || counter.record_pulse())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropoutPolicy {
    /// Zero readings are taken at face value.
    #[default]
    Accept,
    /// Zero readings are discarded while the motor is being driven.
    RejectWhileDriving,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TachometerConfig {
    pub pulses_per_revolution: f64,
    /// Minimum pulse width passed to the hardware glitch filter.
    pub glitch_filter_us: u32,
    /// Readings above this cannot come from the rotor.
    pub max_physical_rpm: f64,
    /// A reading above `jump_factor` times the smoothed value is a spike.
    pub jump_factor: f64,
    /// Jump screening only applies once the smoothed value exceeds this.
    pub noise_floor_rpm: f64,
    /// Weight of the previous smoothed value, in `0.0..1.0`.
    pub smoothing: f64,
    pub dropout_policy: DropoutPolicy,
    /// Consecutive jump rejections after which the next reading is trusted.
    pub jump_confirm_ticks: u32,
}

impl Default for TachometerConfig {
    fn default() -> Self {
        Self {
            pulses_per_revolution: 3.0,
            glitch_filter_us: 100,
            max_physical_rpm: 12_000.0,
            jump_factor: 3.0,
            noise_floor_rpm: 50.0,
            smoothing: 0.5,
            dropout_policy: DropoutPolicy::Accept,
            jump_confirm_ticks: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingVerdict {
    Accepted,
    AboveCeiling,
    ImplausibleJump,
    Dropout,
}

impl ReadingVerdict {
    pub fn is_accepted(self) -> bool {
        matches!(self, ReadingVerdict::Accepted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReadingVerdict::Accepted => "accepted",
            ReadingVerdict::AboveCeiling => "above_ceiling",
            ReadingVerdict::ImplausibleJump => "implausible_jump",
            ReadingVerdict::Dropout => "dropout",
        }
    }
}

/// Outcome of one tick's evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TachometerSample {
    pub raw_pulse_count: u32,
    pub instantaneous_rpm: f64,
    pub smoothed_rpm: f64,
    pub verdict: ReadingVerdict,
}

pub fn rpm_from_pulses(pulses: u32, pulses_per_revolution: f64, elapsed_s: f64) -> f64 {
    if elapsed_s <= 0.0 || pulses_per_revolution <= 0.0 {
        return 0.0;
    }
    let revolutions = f64::from(pulses) / pulses_per_revolution;
    revolutions / elapsed_s * 60.0
}

#[derive(Debug)]
pub struct Tachometer {
    config: TachometerConfig,
    counter: PulseCounter,
    instantaneous_rpm: f64,
    smoothed_rpm: f64,
    pending_jumps: u32,
}

impl Tachometer {
    pub fn new(config: TachometerConfig) -> Self {
        Self {
            config,
            counter: PulseCounter::new(),
            instantaneous_rpm: 0.0,
            smoothed_rpm: 0.0,
            pending_jumps: 0,
        }
    }

    pub fn config(&self) -> &TachometerConfig {
        &self.config
    }

    pub fn counter(&self) -> &PulseCounter {
        &self.counter
    }

    pub fn smoothed(&self) -> f64 {
        self.smoothed_rpm
    }

    /// Smoothed speed as published to clients.
    pub fn smoothed_rpm(&self) -> u32 {
        self.smoothed_rpm.round().max(0.0) as u32
    }

    pub fn instantaneous(&self) -> f64 {
        self.instantaneous_rpm
    }

    /// Closes the current counting window.
    ///
    /// `motion_demanded` tells the dropout screen whether a zero reading is
    /// plausible.
    pub fn evaluate(&mut self, elapsed_s: f64, motion_demanded: bool) -> TachometerSample {
        let pulses = self.counter.take();
        let rpm = rpm_from_pulses(pulses, self.config.pulses_per_revolution, elapsed_s);
        self.instantaneous_rpm = rpm;

        let verdict = self.screen(rpm, motion_demanded);
        if verdict.is_accepted() {
            let alpha = self.config.smoothing.clamp(0.0, 1.0);
            self.smoothed_rpm = alpha * self.smoothed_rpm + (1.0 - alpha) * rpm;
        } else {
            debug!(
                "tachometer reading rejected: rpm={:.0} smoothed={:.0} reason={}",
                rpm,
                self.smoothed_rpm,
                verdict.as_str()
            );
        }

        TachometerSample {
            raw_pulse_count: pulses,
            instantaneous_rpm: rpm,
            smoothed_rpm: self.smoothed_rpm,
            verdict,
        }
    }

    fn screen(&mut self, rpm: f64, motion_demanded: bool) -> ReadingVerdict {
        let cfg = &self.config;
        if rpm > cfg.max_physical_rpm {
            return ReadingVerdict::AboveCeiling;
        }

        let is_jump =
            self.smoothed_rpm > cfg.noise_floor_rpm && rpm > cfg.jump_factor * self.smoothed_rpm;
        if is_jump && self.pending_jumps < cfg.jump_confirm_ticks {
            self.pending_jumps += 1;
            return ReadingVerdict::ImplausibleJump;
        }
        self.pending_jumps = 0;

        if rpm == 0.0 && motion_demanded && cfg.dropout_policy == DropoutPolicy::RejectWhileDriving
        {
            return ReadingVerdict::Dropout;
        }
        ReadingVerdict::Accepted
    }

    /// Drops the pending window and all filter memory.
    pub fn reset(&mut self) {
        self.counter.take();
        self.instantaneous_rpm = 0.0;
        self.smoothed_rpm = 0.0;
        self.pending_jumps = 0;
    }

    #[cfg(test)]
    pub(crate) fn seed_smoothed(&mut self, rpm: f64) {
        self.smoothed_rpm = rpm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulses(tach: &Tachometer, n: u32) {
        for _ in 0..n {
            tach.counter().record_pulse();
        }
    }

    /// Pulse count giving `rpm` over a one second window at 3 pulses/rev.
    fn pulses_for(rpm: u32) -> u32 {
        rpm / 20
    }

    #[test]
    fn nine_pulses_in_one_second_is_180_rpm() {
        let mut tach = Tachometer::new(TachometerConfig::default());
        pulses(&tach, 9);
        let sample = tach.evaluate(1.0, false);
        assert_eq!(sample.raw_pulse_count, 9);
        assert_eq!(sample.instantaneous_rpm, 180.0);
        assert_eq!(sample.verdict, ReadingVerdict::Accepted);
        assert_eq!(sample.smoothed_rpm, 90.0);
        assert_eq!(tach.counter().pending(), 0);
    }

    #[test]
    fn low_counts_are_not_truncated() {
        assert!((rpm_from_pulses(1, 3.0, 1.0) - 20.0).abs() < 1e-9);
        assert!((rpm_from_pulses(1, 3.0, 0.75) - 26.666).abs() < 0.01);
        assert_eq!(rpm_from_pulses(5, 3.0, 0.0), 0.0);
    }

    #[test]
    fn spike_above_three_times_smoothed_is_ignored() {
        let mut tach = Tachometer::new(TachometerConfig::default());
        tach.seed_smoothed(1000.0);
        pulses(&tach, pulses_for(3500));
        let sample = tach.evaluate(1.0, true);
        assert_eq!(sample.verdict, ReadingVerdict::ImplausibleJump);
        assert_eq!(tach.smoothed(), 1000.0);
    }

    #[test]
    fn plausible_change_updates_smoothed() {
        let mut tach = Tachometer::new(TachometerConfig::default());
        tach.seed_smoothed(1000.0);
        pulses(&tach, pulses_for(1100));
        let sample = tach.evaluate(1.0, true);
        assert_eq!(sample.verdict, ReadingVerdict::Accepted);
        assert!((tach.smoothed() - 1050.0).abs() < 1e-9);
    }

    #[test]
    fn reading_above_ceiling_is_ignored_even_from_rest() {
        let mut tach = Tachometer::new(TachometerConfig::default());
        pulses(&tach, 700); // 14_000 rpm
        let sample = tach.evaluate(1.0, false);
        assert_eq!(sample.verdict, ReadingVerdict::AboveCeiling);
        assert_eq!(tach.smoothed(), 0.0);
    }

    #[test]
    fn jump_screen_is_inactive_below_noise_floor() {
        let mut tach = Tachometer::new(TachometerConfig::default());
        tach.seed_smoothed(40.0);
        pulses(&tach, pulses_for(600));
        assert!(tach.evaluate(1.0, true).verdict.is_accepted());
    }

    #[test]
    fn persistent_jump_is_eventually_trusted() {
        let mut tach = Tachometer::new(TachometerConfig::default());
        tach.seed_smoothed(100.0);
        for _ in 0..2 {
            pulses(&tach, pulses_for(600));
            assert_eq!(
                tach.evaluate(1.0, true).verdict,
                ReadingVerdict::ImplausibleJump
            );
        }
        pulses(&tach, pulses_for(600));
        assert!(tach.evaluate(1.0, true).verdict.is_accepted());
        assert_eq!(tach.smoothed(), 350.0);
    }

    #[test]
    fn empty_window_reads_zero_and_decays() {
        let mut tach = Tachometer::new(TachometerConfig::default());
        tach.seed_smoothed(400.0);
        let sample = tach.evaluate(1.0, false);
        assert_eq!(sample.instantaneous_rpm, 0.0);
        assert!(sample.verdict.is_accepted());
        assert_eq!(tach.smoothed(), 200.0);
    }

    #[test]
    fn dropout_policy_holds_value_while_driving() {
        let mut tach = Tachometer::new(TachometerConfig {
            dropout_policy: DropoutPolicy::RejectWhileDriving,
            ..TachometerConfig::default()
        });
        tach.seed_smoothed(400.0);
        assert_eq!(tach.evaluate(1.0, true).verdict, ReadingVerdict::Dropout);
        assert_eq!(tach.smoothed(), 400.0);
        // Not driving: zero is believable.
        assert!(tach.evaluate(1.0, false).verdict.is_accepted());
        assert_eq!(tach.smoothed(), 200.0);
    }

    #[test]
    fn reset_clears_pending_pulses_and_filter() {
        let mut tach = Tachometer::new(TachometerConfig::default());
        tach.seed_smoothed(800.0);
        pulses(&tach, 12);
        tach.reset();
        assert_eq!(tach.counter().pending(), 0);
        assert_eq!(tach.smoothed_rpm(), 0);
    }

    #[test]
    fn counter_is_shared_with_edge_handler() {
        let tach = Tachometer::new(TachometerConfig::default());
        let handler = tach.counter().edge_handler();
        let worker = std::thread::spawn(move || {
            for _ in 0..1000 {
                handler();
            }
        });
        worker.join().unwrap();
        assert_eq!(tach.counter().take(), 1000);
    }
}
