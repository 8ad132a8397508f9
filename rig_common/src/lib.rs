//! Rig Common Library
//!
//! Types shared by the supervisor and the bus drivers of the robotic
//! finger test rig.
//!
//! # Module Structure
//!
//! - [`consts`] - Capacities and timing defaults
//! - [`config`] - Configuration loading traits and types
//! - [`device`] - Device identity, control modes and drive error codes
//! - [`state`] - Global safety state
//! - [`command`] - Host-facing command codes and completion reports
//! - [`bus`] - The actuator bus boundary (`ActuatorBus`)
//! - [`prelude`] - Common re-exports for convenience

pub mod bus;
pub mod command;
pub mod config;
pub mod consts;
pub mod device;
pub mod prelude;
pub mod state;
