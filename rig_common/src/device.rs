//! Actuator controller identity and per-device health record.
//!
//! A [`Device`] is the supervisor's view of one controller on the bus. It
//! is written by the bus receive path (heartbeats, feedback, temperature)
//! and read by the safety and command layers within the same cycle, so
//! there is exactly one writer and one reader at any time.

use crate::consts::Millis;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Bus node id of one actuator controller.
pub type DeviceId = u8;

// ─── Control Mode ───────────────────────────────────────────────────

/// Axis state reported by (and requested from) an actuator controller.
///
/// Discriminants match the controller's wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ControlMode {
    Undefined = 0,
    Idle = 1,
    StartupSequence = 2,
    FullCalibrationSequence = 3,
    MotorCalibration = 4,
    EncoderIndexSearch = 6,
    EncoderOffsetCalibration = 7,
    /// Closed-loop control. Required for any motion.
    ClosedLoop = 8,
    LockinSpin = 9,
    EncoderDirFind = 10,
    Homing = 11,
    EncoderHallPolarityCalibration = 12,
    EncoderHallPhaseCalibration = 13,
}

impl ControlMode {
    /// Decode a wire value. Unknown values map to `None`.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Undefined),
            1 => Some(Self::Idle),
            2 => Some(Self::StartupSequence),
            3 => Some(Self::FullCalibrationSequence),
            4 => Some(Self::MotorCalibration),
            6 => Some(Self::EncoderIndexSearch),
            7 => Some(Self::EncoderOffsetCalibration),
            8 => Some(Self::ClosedLoop),
            9 => Some(Self::LockinSpin),
            10 => Some(Self::EncoderDirFind),
            11 => Some(Self::Homing),
            12 => Some(Self::EncoderHallPolarityCalibration),
            13 => Some(Self::EncoderHallPhaseCalibration),
            _ => None,
        }
    }
}

impl Default for ControlMode {
    fn default() -> Self {
        Self::Undefined
    }
}

// ─── Error Codes ────────────────────────────────────────────────────

bitflags! {
    /// Named bits of a controller's active-error word.
    ///
    /// The supervisor treats the word as opaque; these names exist for
    /// log output and for building the safe-to-clear mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceError: u32 {
        const INITIALIZING              = 0x0000_0001;
        const SYSTEM_LEVEL              = 0x0000_0002;
        const TIMING_ERROR              = 0x0000_0004;
        const MISSING_ESTIMATE          = 0x0000_0008;
        const BAD_CONFIG                = 0x0000_0010;
        const DRV_FAULT                 = 0x0000_0020;
        const MISSING_INPUT             = 0x0000_0040;
        const DC_BUS_OVER_VOLTAGE       = 0x0000_0100;
        const DC_BUS_UNDER_VOLTAGE      = 0x0000_0200;
        const DC_BUS_OVER_CURRENT       = 0x0000_0400;
        const DC_BUS_OVER_REGEN_CURRENT = 0x0000_0800;
        const CURRENT_LIMIT_VIOLATION   = 0x0000_1000;
        const MOTOR_OVER_TEMP           = 0x0000_2000;
        const INVERTER_OVER_TEMP        = 0x0000_4000;
        const VELOCITY_LIMIT_VIOLATION  = 0x0000_8000;
        const POSITION_LIMIT_VIOLATION  = 0x0001_0000;
        const WATCHDOG_TIMER_EXPIRED    = 0x0100_0000;
        /// Set by an e-stop request. The only condition cleared automatically.
        const ESTOP_REQUESTED           = 0x0200_0000;
        const SPINOUT_DETECTED          = 0x0400_0000;
        const BRAKE_RESISTOR_DISARMED   = 0x0800_0000;
        const THERMISTOR_DISCONNECTED   = 0x1000_0000;
        const CALIBRATION_ERROR         = 0x4000_0000;
    }
}

impl DeviceError {
    /// Default set of codes the supervisor may clear on its own.
    pub const SAFE_TO_CLEAR: Self = Self::ESTOP_REQUESTED;
}

impl Default for DeviceError {
    fn default() -> Self {
        Self::empty()
    }
}

/// True if `code` has no bits outside `safe_mask` (zero is always safe).
#[inline]
pub const fn is_safe_to_clear(code: u32, safe_mask: u32) -> bool {
    code & !safe_mask == 0
}

// ─── Device Record ──────────────────────────────────────────────────

/// Supervisor-side record of one actuator controller.
#[derive(Debug, Clone)]
pub struct Device {
    id: DeviceId,
    name: String,
    last_heartbeat_time: Millis,
    heartbeat_timeout: bool,
    received_heartbeat: bool,
    last_error_code: u32,
    control_mode: ControlMode,
    position: Option<f32>,
    velocity: Option<f32>,
    temperature: Option<f32>,
    clear_failed: bool,
    zero_offset: Option<f32>,
}

impl Device {
    /// New record with no frames received. `created_at` seeds the
    /// heartbeat clock so a silent device times out one timeout after
    /// creation.
    pub fn new(id: DeviceId, name: impl Into<String>, created_at: Millis) -> Self {
        Self {
            id,
            name: name.into(),
            last_heartbeat_time: created_at,
            heartbeat_timeout: false,
            received_heartbeat: false,
            last_error_code: 0,
            control_mode: ControlMode::Undefined,
            position: None,
            velocity: None,
            temperature: None,
            clear_failed: false,
            zero_offset: None,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_heartbeat_time(&self) -> Millis {
        self.last_heartbeat_time
    }

    pub fn heartbeat_timeout(&self) -> bool {
        self.heartbeat_timeout
    }

    pub fn received_heartbeat(&self) -> bool {
        self.received_heartbeat
    }

    pub fn error_code(&self) -> u32 {
        self.last_error_code
    }

    pub fn control_mode(&self) -> ControlMode {
        self.control_mode
    }

    /// Last reported position, `None` until the first feedback frame.
    pub fn position(&self) -> Option<f32> {
        self.position
    }

    /// Last reported velocity, `None` until the first feedback frame.
    pub fn velocity(&self) -> Option<f32> {
        self.velocity
    }

    /// Last reported motor temperature, `None` until the first frame.
    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    pub fn received_feedback(&self) -> bool {
        self.position.is_some()
    }

    pub fn clear_failed(&self) -> bool {
        self.clear_failed
    }

    /// Position recorded by the last successful calibration.
    pub fn zero_offset(&self) -> Option<f32> {
        self.zero_offset
    }

    /// Record a heartbeat frame. Returns the previous error code if the
    /// code changed.
    pub fn apply_heartbeat(
        &mut self,
        now: Millis,
        error_code: u32,
        control_mode: ControlMode,
    ) -> Option<u32> {
        let previous = self.last_error_code;
        self.last_heartbeat_time = now;
        self.heartbeat_timeout = false;
        self.received_heartbeat = true;
        self.last_error_code = error_code;
        self.control_mode = control_mode;
        if error_code == 0 {
            self.clear_failed = false;
        }
        (previous != error_code).then_some(previous)
    }

    pub fn apply_feedback(&mut self, position: f32, velocity: f32) {
        self.position = Some(position);
        self.velocity = Some(velocity);
    }

    pub fn apply_temperature(&mut self, temperature: f32) {
        self.temperature = Some(temperature);
    }

    /// Recompute the derived timeout flag. Returns the new value.
    pub fn refresh_timeout(&mut self, now: Millis, timeout_ms: Millis) -> bool {
        self.heartbeat_timeout = now.saturating_sub(self.last_heartbeat_time) > timeout_ms;
        self.heartbeat_timeout
    }

    pub fn set_clear_failed(&mut self, failed: bool) {
        self.clear_failed = failed;
    }

    pub fn set_zero_offset(&mut self, offset: f32) {
        self.zero_offset = Some(offset);
    }
}
