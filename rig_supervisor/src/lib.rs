//! # Rig Supervisor
//!
//! Safety supervisor for a two-joint robotic finger test rig. One
//! periodic loop owns the actuator bus and, every cycle:
//!
//! 1. drains bus frames into the [`health::DeviceHealthMonitor`],
//! 2. aggregates faults into a [`safety::FaultReport`],
//! 3. advances the [`safety::SafetyStateMachine`] and executes the
//!    resulting entry/exit actions,
//! 4. ticks the [`command::CommandScheduler`] while the rig is `Active`.
//!
//! ## Module Structure
//!
//! - [`clock`] - Injected monotonic time source
//! - [`config`] - Supervisor TOML configuration
//! - [`health`] - Device liveness and bus frame ingestion
//! - [`actuator`] - Per-device command handles
//! - [`safety`] - Fault aggregation, state machine, actions, status lamps
//! - [`command`] - Command lifecycle, batch slices, calibration, scheduler
//! - [`startup`] - Bounded discovery and closed-loop enable
//! - [`supervisor`] - The per-cycle aggregate
//! - [`cycle`] - Paced cycle loop and timing statistics

pub mod actuator;
pub mod clock;
pub mod command;
pub mod config;
pub mod cycle;
pub mod error;
pub mod health;
pub mod safety;
pub mod startup;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;
