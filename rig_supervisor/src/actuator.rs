//! Per-device command handles.
//!
//! Commands never touch the bus directly. They receive an [`Actuators`]
//! view for the duration of one tick and borrow an [`ActuatorHandle`] for
//! the device they drive. Sends are fire-and-forget; readings are the
//! last values the health monitor recorded.

use rig_common::bus::{ActuatorBus, BusError};
use rig_common::device::{ControlMode, Device, DeviceId};

use crate::health::DeviceHealthMonitor;

/// Bus plus device table, borrowed for one scheduler tick.
pub struct Actuators<'a> {
    bus: &'a mut dyn ActuatorBus,
    monitor: &'a DeviceHealthMonitor,
}

impl<'a> Actuators<'a> {
    pub fn new(bus: &'a mut dyn ActuatorBus, monitor: &'a DeviceHealthMonitor) -> Self {
        Self { bus, monitor }
    }

    pub fn handle(&mut self, id: DeviceId) -> ActuatorHandle<'_> {
        ActuatorHandle {
            id,
            bus: &mut *self.bus,
            device: self.monitor.device(id),
        }
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.monitor.device(id)
    }
}

/// Command and telemetry access for one device.
pub struct ActuatorHandle<'a> {
    id: DeviceId,
    bus: &'a mut dyn ActuatorBus,
    device: Option<&'a Device>,
}

impl ActuatorHandle<'_> {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn set_torque(&mut self, torque: f32) -> Result<(), BusError> {
        self.bus.send_torque(self.id, torque)
    }

    pub fn set_velocity(&mut self, velocity: f32) -> Result<(), BusError> {
        self.bus.send_velocity(self.id, velocity)
    }

    pub fn set_position(&mut self, position: f32) -> Result<(), BusError> {
        self.bus.send_position(self.id, position)
    }

    pub fn set_state(&mut self, mode: ControlMode) -> Result<(), BusError> {
        self.bus.send_state(self.id, mode)
    }

    pub fn estop(&mut self) -> Result<(), BusError> {
        self.bus.send_estop(self.id)
    }

    pub fn position(&self) -> Option<f32> {
        self.device.and_then(Device::position)
    }

    pub fn velocity(&self) -> Option<f32> {
        self.device.and_then(Device::velocity)
    }

    pub fn error_code(&self) -> u32 {
        self.device.map_or(0, Device::error_code)
    }

    pub fn control_mode(&self) -> ControlMode {
        self.device.map_or(ControlMode::Undefined, Device::control_mode)
    }
}
