//! Recording bus for unit tests.

use std::collections::VecDeque;

use rig_common::bus::{ActuatorBus, BusError, BusEvent};
use rig_common::consts::Millis;
use rig_common::device::{ControlMode, DeviceId};

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    State(DeviceId, ControlMode),
    Torque(DeviceId, f32),
    Velocity(DeviceId, f32),
    Position(DeviceId, f32),
    Estop(DeviceId),
    Clear(DeviceId),
    Reboot,
}

/// Records every outbound call; inbound frames are queued by the test.
#[derive(Debug, Default)]
pub struct RecordingBus {
    pub ids: Vec<DeviceId>,
    pub sent: Vec<Sent>,
    pub inbox: VecDeque<BusEvent>,
    pub refuse_clear: bool,
    pub last_poll: Option<Millis>,
}

impl RecordingBus {
    pub fn new(ids: &[DeviceId]) -> Self {
        Self {
            ids: ids.to_vec(),
            ..Self::default()
        }
    }

    pub fn push_heartbeat(&mut self, device: DeviceId, error_code: u32, mode: ControlMode) {
        self.inbox.push_back(BusEvent::Heartbeat {
            device,
            error_code,
            control_mode: mode,
        });
    }

    pub fn push_feedback(&mut self, device: DeviceId, position: f32, velocity: f32) {
        self.inbox.push_back(BusEvent::Feedback {
            device,
            position,
            velocity,
        });
    }

    fn check(&self, device: DeviceId) -> Result<(), BusError> {
        if self.ids.contains(&device) {
            Ok(())
        } else {
            Err(BusError::UnknownDevice(device))
        }
    }

    fn record(&mut self, device: DeviceId, sent: Sent) -> Result<(), BusError> {
        self.check(device)?;
        self.sent.push(sent);
        Ok(())
    }
}

impl ActuatorBus for RecordingBus {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn poll_bus(&mut self, now: Millis, sink: &mut dyn FnMut(BusEvent)) {
        self.last_poll = Some(now);
        while let Some(event) = self.inbox.pop_front() {
            sink(event);
        }
    }

    fn send_state(&mut self, device: DeviceId, mode: ControlMode) -> Result<(), BusError> {
        self.record(device, Sent::State(device, mode))
    }

    fn send_torque(&mut self, device: DeviceId, torque: f32) -> Result<(), BusError> {
        self.record(device, Sent::Torque(device, torque))
    }

    fn send_velocity(&mut self, device: DeviceId, velocity: f32) -> Result<(), BusError> {
        self.record(device, Sent::Velocity(device, velocity))
    }

    fn send_position(&mut self, device: DeviceId, position: f32) -> Result<(), BusError> {
        self.record(device, Sent::Position(device, position))
    }

    fn send_estop(&mut self, device: DeviceId) -> Result<(), BusError> {
        self.record(device, Sent::Estop(device))
    }

    fn clear_errors(&mut self, device: DeviceId) -> bool {
        self.sent.push(Sent::Clear(device));
        self.check(device).is_ok() && !self.refuse_clear
    }

    fn reboot_controller(&mut self) {
        self.sent.push(Sent::Reboot);
    }
}
