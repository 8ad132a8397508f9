//! Monotonic time source.
//!
//! Every wait in the supervisor is expressed against a [`Clock`] so tests
//! drive time explicitly instead of sleeping.

use rig_common::consts::Millis;
use std::cell::Cell;
use std::time::{Duration, Instant};

/// Monotonic millisecond clock with a blocking delay.
pub trait Clock {
    fn now_ms(&self) -> Millis;
    fn delay_ms(&self, ms: Millis);
}

/// Wall clock backed by `Instant`, counting from construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> Millis {
        self.epoch.elapsed().as_millis() as Millis
    }

    fn delay_ms(&self, ms: Millis) {
        if ms > 0 {
            std::thread::sleep(Duration::from_millis(ms));
        }
    }
}

/// Test clock. `delay_ms` advances time instantly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Millis>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, ms: Millis) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set(&self, now: Millis) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }

    fn delay_ms(&self, ms: Millis) {
        self.advance(ms);
    }
}
