//! Execution of transition actions against the bus.

use rig_common::bus::ActuatorBus;
use rig_common::consts::MAX_DEVICES;
use rig_common::device::{ControlMode, DeviceId, is_safe_to_clear};
use tracing::{error, info, warn};

use super::machine::SafetyAction;
use crate::health::DeviceHealthMonitor;

/// What the caller must do after an action ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionEffect {
    Continue,
    /// The controller was told to reset; the cycle loop must restart.
    Reboot,
}

pub fn execute(
    action: SafetyAction,
    bus: &mut dyn ActuatorBus,
    monitor: &mut DeviceHealthMonitor,
    safe_mask: u32,
) -> ActionEffect {
    match action {
        SafetyAction::StopAll => {
            for id in ids(monitor) {
                if let Err(e) = bus.send_torque(id, 0.0) {
                    warn!(device = id, "stop failed: {e}");
                }
            }
        }
        SafetyAction::RequestDisable => {
            for id in ids(monitor) {
                if let Err(e) = bus.send_estop(id) {
                    error!(device = id, "e-stop send failed: {e}");
                }
            }
        }
        SafetyAction::RequestEnable => {
            for id in ids(monitor) {
                clear_safe_errors(id, bus, monitor, safe_mask);
                if let Err(e) = bus.send_state(id, ControlMode::ClosedLoop) {
                    warn!(device = id, "enable request failed: {e}");
                }
            }
        }
        SafetyAction::Reboot => {
            error!(bus = bus.name(), "all devices silent, rebooting controller");
            bus.reboot_controller();
            return ActionEffect::Reboot;
        }
    }
    ActionEffect::Continue
}

/// Clear `id`'s errors if every set bit is in `safe_mask`. The outcome is
/// recorded on the device so a refused clear keeps the rig in fault.
pub fn clear_safe_errors(
    id: DeviceId,
    bus: &mut dyn ActuatorBus,
    monitor: &mut DeviceHealthMonitor,
    safe_mask: u32,
) -> bool {
    let code = monitor.device(id).map_or(0, |d| d.error_code());
    let cleared = if is_safe_to_clear(code, safe_mask) {
        bus.clear_errors(id)
    } else {
        warn!(device = id, code, "error is not safe to clear automatically");
        false
    };
    if cleared && code != 0 {
        info!(device = id, code, "cleared device errors");
    }
    monitor.set_clear_failed(id, !cleared);
    cleared
}

fn ids(monitor: &DeviceHealthMonitor) -> heapless::Vec<DeviceId, MAX_DEVICES> {
    monitor.ids().collect()
}
