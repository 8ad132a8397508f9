//! Actuator bus boundary.
//!
//! This module defines:
//! - `ActuatorBus` trait - the only interface through which the
//!   supervisor talks to actuator controllers
//! - `BusEvent` - frames delivered by `poll_bus`
//! - `BusError` - transmit-side failures
//!
//! # Contract
//!
//! | Operation | Blocking | Effect |
//! |-----------|----------|--------|
//! | `poll_bus()` | never | drains received frames into the sink |
//! | `send_*()` | never | queues one frame, state change is eventual |
//! | `clear_errors()` | may wait for an acknowledgement | clears the drive's error word |
//! | `reboot_controller()` | does not return on hardware | resets the supervising controller |
//!
//! Every command is fire-and-forget. Confirmation arrives later through
//! heartbeat and feedback frames.

use crate::consts::Millis;
use crate::device::{ControlMode, DeviceId};
use thiserror::Error;

/// Transmit-side bus failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BusError {
    /// No controller with this id is attached.
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),

    /// The frame could not be queued.
    #[error("transmit to device {device} failed: {reason}")]
    Transmit { device: DeviceId, reason: String },

    /// The bus interface is down.
    #[error("bus not connected")]
    NotConnected,
}

/// A frame received from one controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BusEvent {
    /// Periodic liveness frame carrying the active error word and axis state.
    Heartbeat {
        device: DeviceId,
        error_code: u32,
        control_mode: ControlMode,
    },
    /// Encoder estimate.
    Feedback {
        device: DeviceId,
        position: f32,
        velocity: f32,
    },
    /// Motor thermistor reading.
    Temperature { device: DeviceId, motor_temperature: f32 },
}

impl BusEvent {
    pub const fn device(&self) -> DeviceId {
        match self {
            Self::Heartbeat { device, .. }
            | Self::Feedback { device, .. }
            | Self::Temperature { device, .. } => *device,
        }
    }
}

/// Interface to the actuator controllers.
///
/// Implemented by hardware drivers and by the simulator in `rig_hal`.
pub trait ActuatorBus {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Deliver every frame received since the last poll.
    ///
    /// `now` is the supervisor clock; simulated buses advance their
    /// physics to it.
    fn poll_bus(&mut self, now: Millis, sink: &mut dyn FnMut(BusEvent));

    /// Request an axis state change.
    fn send_state(&mut self, device: DeviceId, mode: ControlMode) -> Result<(), BusError>;

    /// Torque setpoint (switches the device to torque control).
    fn send_torque(&mut self, device: DeviceId, torque: f32) -> Result<(), BusError>;

    /// Velocity setpoint (switches the device to velocity control).
    fn send_velocity(&mut self, device: DeviceId, velocity: f32) -> Result<(), BusError>;

    /// Position setpoint (switches the device to position control).
    fn send_position(&mut self, device: DeviceId, position: f32) -> Result<(), BusError>;

    /// Emergency stop. The device drops to idle and latches ESTOP_REQUESTED.
    fn send_estop(&mut self, device: DeviceId) -> Result<(), BusError>;

    /// Clear the device's error word. Returns false if the device refused
    /// or did not answer.
    fn clear_errors(&mut self, device: DeviceId) -> bool;

    /// Reset the supervising controller.
    fn reboot_controller(&mut self);
}
