//! Common re-exports: `use rig_common::prelude::*;`

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{HEARTBEAT_TIMEOUT_MS, MAX_COMMANDS, MAX_DEVICES, Millis};

// ─── Devices & State ────────────────────────────────────────────────
pub use crate::device::{ControlMode, Device, DeviceError, DeviceId, is_safe_to_clear};
pub use crate::state::SystemState;

// ─── Commands ───────────────────────────────────────────────────────
pub use crate::command::{CalibrationReport, ControlType, ExecutionStats, JointOutcome};

// ─── Bus ────────────────────────────────────────────────────────────
pub use crate::bus::{ActuatorBus, BusError, BusEvent};
