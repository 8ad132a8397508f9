//! Safety layer: fault aggregation, the global state machine, execution
//! of transition actions and status lamp derivation.
//!
//! Evaluation order per cycle: [`faults::evaluate`] builds a
//! [`FaultReport`], [`SafetyStateMachine::advance`] turns it into at most
//! one [`Transition`], and [`actions::execute`] applies that transition's
//! actions to the bus.

pub mod actions;
pub mod faults;
pub mod lamp;
pub mod machine;

pub use actions::ActionEffect;
pub use faults::{FaultReport, SafetyInputs};
pub use lamp::{LampColor, StatusLamps};
pub use machine::{AdvanceResult, SafetyAction, SafetyStateMachine, Transition};
