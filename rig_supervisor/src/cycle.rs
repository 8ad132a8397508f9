//! Paced cycle loop.
//!
//! Calls [`Supervisor::cycle`] once per `cycle_time_ms`, measures how
//! long each cycle took, and sleeps for the remainder of the period.
//! A cycle that exceeds its period is counted as an overrun and the next
//! cycle starts immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rig_common::bus::ActuatorBus;
use rig_common::consts::Millis;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::supervisor::{CycleOutcome, Supervisor};

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    pub cycle_count: u64,
    /// Last cycle duration [µs].
    pub last_cycle_us: u64,
    pub min_cycle_us: u64,
    pub max_cycle_us: u64,
    sum_cycle_us: u64,
    pub overruns: u64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_us: 0,
            min_cycle_us: u64::MAX,
            max_cycle_us: 0,
            sum_cycle_us: 0,
            overruns: 0,
        }
    }

    #[inline]
    pub fn record(&mut self, duration_us: u64, budget_us: u64) {
        self.cycle_count += 1;
        self.last_cycle_us = duration_us;
        self.min_cycle_us = self.min_cycle_us.min(duration_us);
        self.max_cycle_us = self.max_cycle_us.max(duration_us);
        self.sum_cycle_us = self.sum_cycle_us.saturating_add(duration_us);
        if duration_us > budget_us {
            self.overruns += 1;
        }
    }

    /// Average cycle time [µs] (0 if no cycles).
    pub fn avg_cycle_us(&self) -> u64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_us / self.cycle_count
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Runner ─────────────────────────────────────────────────────────

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The running flag was cleared.
    Stopped,
    /// The supervisor requested a controller reboot.
    Reboot,
    /// The loop condition ended the run.
    Finished,
}

pub struct CycleRunner<'c, B: ActuatorBus> {
    supervisor: Supervisor<B>,
    clock: &'c dyn Clock,
    cycle_time_ms: Millis,
    running: Arc<AtomicBool>,
    stats: CycleStats,
}

impl<'c, B: ActuatorBus> CycleRunner<'c, B> {
    pub fn new(supervisor: Supervisor<B>, clock: &'c dyn Clock, running: Arc<AtomicBool>) -> Self {
        let cycle_time_ms = supervisor.config().supervisor.cycle_time_ms;
        Self {
            supervisor,
            clock,
            cycle_time_ms,
            running,
            stats: CycleStats::new(),
        }
    }

    pub fn supervisor(&self) -> &Supervisor<B> {
        &self.supervisor
    }

    pub fn supervisor_mut(&mut self) -> &mut Supervisor<B> {
        &mut self.supervisor
    }

    pub fn into_supervisor(self) -> Supervisor<B> {
        self.supervisor
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub fn now_ms(&self) -> Millis {
        self.clock.now_ms()
    }

    /// Run `max_cycles` cycles (`None` = until stopped or rebooted).
    pub fn run(&mut self, max_cycles: Option<u64>) -> RunOutcome {
        let mut remaining = max_cycles;
        self.run_while(|_| match remaining.as_mut() {
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
            None => true,
        })
    }

    /// Run while `proceed` returns true. `proceed` is checked before each
    /// cycle.
    pub fn run_while(&mut self, mut proceed: impl FnMut(&Supervisor<B>) -> bool) -> RunOutcome {
        let budget_us = self.cycle_time_ms * 1000;
        loop {
            if !self.running.load(Ordering::SeqCst) {
                info!(cycles = self.stats.cycle_count, "cycle loop stopped");
                return RunOutcome::Stopped;
            }
            if !proceed(&self.supervisor) {
                return RunOutcome::Finished;
            }

            let started = Instant::now();
            let outcome = self.supervisor.cycle(self.clock.now_ms());
            let elapsed_us = started.elapsed().as_micros() as u64;
            self.stats.record(elapsed_us, budget_us);

            if outcome == CycleOutcome::Reboot {
                warn!(cycles = self.stats.cycle_count, "reboot requested");
                return RunOutcome::Reboot;
            }

            if elapsed_us > budget_us {
                warn!(
                    elapsed_us,
                    budget_us,
                    overruns = self.stats.overruns,
                    "cycle overrun"
                );
            } else {
                self.clock
                    .delay_ms(self.cycle_time_ms.saturating_sub(elapsed_us / 1000));
            }
        }
    }
}
