use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Source of local time in seconds.
pub trait Clock {
    fn now(&self) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Shared, manually advanced clock. Clones observe the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, delta: f64) {
        self.now.set(self.now.get() + delta);
    }

    pub fn set(&self, now: f64) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

/// Fires once per `interval` without accumulating drift from late calls.
///
/// After a late call the next deadline snaps to the interval grid instead of
/// firing repeatedly to catch up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalTimer {
    interval: f64,
    last: f64,
}

impl IntervalTimer {
    pub fn new(interval: f64) -> Self {
        Self { interval, last: 0.0 }
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn elapsed(&mut self, now: f64) -> bool {
        if now < self.last + self.interval {
            return false;
        }
        self.last = (now / self.interval).floor() * self.interval;
        true
    }

    pub fn reset(&mut self) {
        self.last = 0.0;
    }
}
