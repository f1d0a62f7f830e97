use std::time::Instant;

/// Monotonic clock anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Monotonic microseconds since start.
    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

/// Clock source for backends that may run off a manual timeline.
#[derive(Debug, Clone, Copy)]
pub enum SimClock {
    Wall(TimeBase),
    Manual { now_us: u64 },
}

impl SimClock {
    pub fn now_us(&self) -> u64 {
        match self {
            SimClock::Wall(tb) => tb.now_us(),
            SimClock::Manual { now_us } => *now_us,
        }
    }

    /// Moves a manual clock forward; a wall clock advances on its own.
    pub fn advance(&mut self, dt_s: f64) {
        if let SimClock::Manual { now_us } = self {
            *now_us += (dt_s * 1_000_000.0).round() as u64;
        }
    }
}
