//! Shared fixture: two-joint rig on the simulated bus.

use rig_common::state::SystemState;
use rig_hal::SimulatedBus;
use rig_supervisor::clock::{Clock, ManualClock};
use rig_supervisor::config::{SupervisorConfig, load_config_from_str};
use rig_supervisor::supervisor::{CycleOutcome, Supervisor};

pub const TWO_JOINTS: &str = r#"
[shared]
service_name = "rig-it"

[[devices]]
id = 0
name = "proximal"
calibration_direction = "positive"

[[devices]]
id = 1
name = "distal"
calibration_direction = "negative"

[calibration]
timeout_ms = 3000
"#;

pub fn config() -> SupervisorConfig {
    load_config_from_str(TWO_JOINTS).unwrap()
}

pub fn bus(config: &SupervisorConfig) -> SimulatedBus {
    SimulatedBus::new(
        config.simulation.clone(),
        config.devices.iter().map(|d| d.id),
    )
}

pub struct Rig {
    pub clock: ManualClock,
    pub sup: Supervisor<SimulatedBus>,
}

impl Rig {
    /// Supervisor created at t=0, startup not yet run.
    pub fn new() -> Self {
        let config = config();
        let bus = bus(&config);
        Self {
            clock: ManualClock::new(0),
            sup: Supervisor::new(config, bus, 0),
        }
    }

    /// Started rig with the deadman held, cycled until `Active`.
    pub fn active() -> Self {
        let mut rig = Self::new();
        rig.sup.startup(&rig.clock).unwrap();
        rig.sup.set_deadman(true);
        assert!(rig.run_until(500, |s| s.state() == SystemState::Active));
        rig
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// One cycle period later.
    pub fn step(&mut self) -> CycleOutcome {
        self.clock.advance(self.sup.config().supervisor.cycle_time_ms);
        self.sup.cycle(self.clock.now_ms())
    }

    /// Cycle for `ms`. Stops early on a reboot request.
    pub fn run_for(&mut self, ms: u64) -> CycleOutcome {
        let end = self.now() + ms;
        while self.now() < end {
            if self.step() == CycleOutcome::Reboot {
                return CycleOutcome::Reboot;
            }
        }
        CycleOutcome::Continue
    }

    /// Cycle until `done` holds, at most `max_ms`. Returns whether it held.
    pub fn run_until(
        &mut self,
        max_ms: u64,
        mut done: impl FnMut(&Supervisor<SimulatedBus>) -> bool,
    ) -> bool {
        let end = self.now() + max_ms;
        while self.now() < end {
            self.step();
            if done(&self.sup) {
                return true;
            }
        }
        false
    }
}
