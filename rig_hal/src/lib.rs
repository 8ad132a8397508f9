//! # Rig HAL
//!
//! Actuator bus implementations for the finger rig supervisor.
//!
//! Only the software simulation lives here. A hardware driver implements
//! the same [`rig_common::bus::ActuatorBus`] trait.

pub mod sim;

pub use sim::{DriveSimulator, SimConfig, SimulatedBus};
