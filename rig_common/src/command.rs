//! Host-facing command codes and completion reports.
//!
//! These are the values that cross the boundary to whatever host
//! protocol sits in front of the supervisor.

use crate::consts::{MAX_DEVICES, Millis};
use crate::device::DeviceId;
use serde::{Deserialize, Serialize};

/// Control type requested by the host. Discriminants are wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ControlType {
    Position = 0,
    Velocity = 1,
    Torque = 2,
}

impl ControlType {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Position),
            1 => Some(Self::Velocity),
            2 => Some(Self::Torque),
            _ => None,
        }
    }
}

/// Summary emitted once per batch execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Wall time from `start_execution` to completion or abort.
    pub elapsed_ms: Millis,
    /// Commands whose end hook ran.
    pub executed_count: usize,
    /// True when every command ran to its natural end.
    pub success: bool,
}

/// Result of calibrating one joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JointOutcome {
    /// Joint came to rest against its stop at `zero_position`.
    Settled { zero_position: f32 },
    /// Joint never settled within the calibration timeout.
    TimedOut,
    /// Calibration was interrupted by a safety transition.
    Aborted,
}

impl JointOutcome {
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }
}

/// Summary emitted once per calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub success: bool,
    pub elapsed_ms: Millis,
    pub joints: heapless::Vec<(DeviceId, JointOutcome), MAX_DEVICES>,
}

impl CalibrationReport {
    /// Zero position recorded for `device`, if it settled.
    pub fn zero_position(&self, device: DeviceId) -> Option<f32> {
        self.joints.iter().find_map(|(id, outcome)| match outcome {
            JointOutcome::Settled { zero_position } if *id == device => Some(*zero_position),
            _ => None,
        })
    }
}
