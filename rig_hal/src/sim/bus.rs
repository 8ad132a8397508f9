//! Simulated actuator bus.

use rig_common::bus::{ActuatorBus, BusError, BusEvent};
use rig_common::consts::Millis;
use rig_common::device::{ControlMode, DeviceId};
use tracing::{debug, info, warn};

use super::SimConfig;
use super::drive::{DriveSimulator, Setpoint};

/// [`ActuatorBus`] backed by one [`DriveSimulator`] per device.
///
/// Physics advance on every `poll_bus` to the supervisor's clock, so a
/// manual clock gives fully deterministic runs.
#[derive(Debug, Clone)]
pub struct SimulatedBus {
    drives: Vec<DriveSimulator>,
    /// Time of the most recent poll. Commands take effect at this time.
    now: Millis,
    connected: bool,
    reboot_count: u32,
}

impl SimulatedBus {
    pub fn new(config: SimConfig, ids: impl IntoIterator<Item = DeviceId>) -> Self {
        let drives: Vec<_> = ids
            .into_iter()
            .map(|id| DriveSimulator::new(id, config.clone()))
            .collect();
        info!(drives = drives.len(), "simulated bus created");
        Self {
            drives,
            now: 0,
            connected: true,
            reboot_count: 0,
        }
    }

    pub fn drive(&self, id: DeviceId) -> Option<&DriveSimulator> {
        self.drives.iter().find(|d| d.id() == id)
    }

    pub fn drive_mut(&mut self, id: DeviceId) -> Option<&mut DriveSimulator> {
        self.drives.iter_mut().find(|d| d.id() == id)
    }

    pub fn drives(&self) -> &[DriveSimulator] {
        &self.drives
    }

    /// Number of `reboot_controller` calls so far.
    pub fn reboot_count(&self) -> u32 {
        self.reboot_count
    }

    // ─── Fault Injection ────────────────────────────────────────────

    /// Disconnect the whole interface; every send fails.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Stop (or resume) all frames from one drive.
    pub fn set_silent(&mut self, id: DeviceId, silent: bool) -> Result<(), BusError> {
        self.target(id)?.set_silent(silent);
        Ok(())
    }

    pub fn inject_error(&mut self, id: DeviceId, code: u32) -> Result<(), BusError> {
        warn!(device = id, code, "injecting drive fault");
        self.target(id)?.inject_error(code);
        Ok(())
    }

    fn target(&mut self, id: DeviceId) -> Result<&mut DriveSimulator, BusError> {
        self.drive_mut(id).ok_or(BusError::UnknownDevice(id))
    }

    fn connected_target(&mut self, id: DeviceId) -> Result<&mut DriveSimulator, BusError> {
        if !self.connected {
            return Err(BusError::NotConnected);
        }
        self.target(id)
    }
}

impl ActuatorBus for SimulatedBus {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn poll_bus(&mut self, now: Millis, sink: &mut dyn FnMut(BusEvent)) {
        self.now = now;
        for drive in &mut self.drives {
            drive.step(now);
            if self.connected {
                drive.emit(now, sink);
            }
        }
    }

    fn send_state(&mut self, device: DeviceId, mode: ControlMode) -> Result<(), BusError> {
        let now = self.now;
        self.connected_target(device)?.request_state(mode, now);
        Ok(())
    }

    fn send_torque(&mut self, device: DeviceId, torque: f32) -> Result<(), BusError> {
        self.connected_target(device)?
            .set_setpoint(Setpoint::Torque(torque));
        Ok(())
    }

    fn send_velocity(&mut self, device: DeviceId, velocity: f32) -> Result<(), BusError> {
        self.connected_target(device)?
            .set_setpoint(Setpoint::Velocity(velocity));
        Ok(())
    }

    fn send_position(&mut self, device: DeviceId, position: f32) -> Result<(), BusError> {
        self.connected_target(device)?
            .set_setpoint(Setpoint::Position(position));
        Ok(())
    }

    fn send_estop(&mut self, device: DeviceId) -> Result<(), BusError> {
        self.connected_target(device)?.estop();
        Ok(())
    }

    fn clear_errors(&mut self, device: DeviceId) -> bool {
        match self.connected_target(device) {
            Ok(drive) => drive.clear_errors(),
            Err(e) => {
                debug!(device, "clear_errors not delivered: {e}");
                false
            }
        }
    }

    fn reboot_controller(&mut self) {
        self.reboot_count += 1;
        warn!(count = self.reboot_count, "controller reboot");
        self.connected = true;
        for drive in &mut self.drives {
            drive.power_cycle();
        }
    }
}
