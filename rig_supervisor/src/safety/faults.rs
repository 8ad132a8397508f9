//! Fault aggregation.
//!
//! Folds device health, operator inputs and the current state's required
//! control mode into one [`FaultReport`]. `has_error()` is the single
//! predicate the state machine consumes.

use rig_common::device::{ControlMode, Device, DeviceId, is_safe_to_clear};
use rig_common::state::SystemState;

use crate::health::DeviceHealthMonitor;

/// Operator inputs sampled once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SafetyInputs {
    /// E-stop asserted.
    pub estop: bool,
    /// Deadman switch held.
    pub deadman: bool,
}

/// Why the rig is (or is not) in fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultReport {
    /// Heartbeat-lost devices, by table index.
    pub heartbeat_lost: u8,
    /// Every tracked device has lost its heartbeat.
    pub all_lost: bool,
    pub estop: bool,
    /// First device whose error code may not be cleared automatically.
    pub device_fault: Option<(DeviceId, u32)>,
    /// First device not in the mode the current state requires.
    pub mode_mismatch: Option<(DeviceId, ControlMode)>,
    /// First device not yet in closed loop, whatever the state. Not an
    /// error; holds `Ready` until every drive is armed.
    pub unarmed: Option<(DeviceId, ControlMode)>,
}

impl FaultReport {
    #[inline]
    pub const fn has_error(&self) -> bool {
        self.heartbeat_lost != 0
            || self.estop
            || self.device_fault.is_some()
            || self.mode_mismatch.is_some()
    }

    #[inline]
    pub const fn all_timed_out(&self) -> bool {
        self.all_lost
    }
}

/// Control mode every device must report while in `state`.
pub const fn required_mode(state: SystemState) -> Option<ControlMode> {
    match state {
        SystemState::Active => Some(ControlMode::ClosedLoop),
        SystemState::Init | SystemState::Ready | SystemState::Error => None,
    }
}

/// A device error is a fault if it has bits outside `safe_mask`, or if it
/// is non-zero and the last automatic clear did not succeed.
pub fn is_device_fault(device: &Device, safe_mask: u32) -> bool {
    let code = device.error_code();
    !is_safe_to_clear(code, safe_mask) || (code != 0 && device.clear_failed())
}

pub fn evaluate(
    monitor: &DeviceHealthMonitor,
    inputs: &SafetyInputs,
    state: SystemState,
    safe_mask: u32,
) -> FaultReport {
    let required = required_mode(state);
    let devices = monitor.devices();

    let device_fault = devices
        .iter()
        .find(|d| is_device_fault(d, safe_mask))
        .map(|d| (d.id(), d.error_code()));

    let mode_mismatch = required.and_then(|mode| {
        devices
            .iter()
            .find(|d| d.control_mode() != mode)
            .map(|d| (d.id(), d.control_mode()))
    });

    let unarmed = devices
        .iter()
        .find(|d| d.control_mode() != ControlMode::ClosedLoop)
        .map(|d| (d.id(), d.control_mode()));

    FaultReport {
        heartbeat_lost: monitor.timeout_mask(),
        all_lost: monitor.all_timed_out(),
        estop: inputs.estop,
        device_fault,
        mode_mismatch,
        unarmed,
    }
}
