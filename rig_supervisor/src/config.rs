//! Supervisor configuration with validation.
//!
//! One TOML file carries the shared table, loop timing, the device list,
//! calibration parameters, command defaults and the simulated bus.
//! Every section except `[[devices]]` may be omitted.

use std::collections::HashSet;
use std::path::Path;

use rig_common::config::{ConfigError, ConfigLoader, SharedConfig};
use rig_common::consts::{
    CYCLE_TIME_MS, DISCOVERY_TIMEOUT_MS, ENABLE_TIMEOUT_MS, HEARTBEAT_TIMEOUT_MS, MAX_DEVICES,
    Millis,
};
use rig_common::device::{DeviceError, DeviceId};
use rig_hal::sim::SimConfig;
use serde::{Deserialize, Serialize};

// ─── Sections ───────────────────────────────────────────────────────

/// Complete supervisor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub shared: SharedConfig,
    #[serde(default)]
    pub supervisor: LoopConfig,
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub commands: CommandDefaults,
    /// Parameters of the simulated bus used by the binary.
    #[serde(default)]
    pub simulation: SimConfig,
}

/// `[supervisor]` loop timing and startup bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default = "default_cycle_time_ms")]
    pub cycle_time_ms: Millis,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: Millis,
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: Millis,
    #[serde(default = "default_enable_timeout_ms")]
    pub enable_timeout_ms: Millis,
    #[serde(default = "default_enable_poll_interval_ms")]
    pub enable_poll_interval_ms: Millis,
    #[serde(default = "default_enable_retry_polls")]
    pub enable_retry_polls: u32,
    /// Error bits the supervisor may clear without operator action.
    #[serde(default = "default_safe_error_mask")]
    pub safe_error_mask: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            cycle_time_ms: default_cycle_time_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            enable_timeout_ms: default_enable_timeout_ms(),
            enable_poll_interval_ms: default_enable_poll_interval_ms(),
            enable_retry_polls: default_enable_retry_polls(),
            safe_error_mask: default_safe_error_mask(),
        }
    }
}

/// Direction a joint is pushed towards its mechanical stop during calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationDirection {
    #[default]
    Positive,
    Negative,
}

impl CalibrationDirection {
    pub const fn sign(self) -> f32 {
        match self {
            Self::Positive => 1.0,
            Self::Negative => -1.0,
        }
    }
}

/// One `[[devices]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub calibration_direction: CalibrationDirection,
}

/// `[calibration]` zeroing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Push torque magnitude [N·m].
    #[serde(default = "default_calibration_torque")]
    pub torque: f32,
    #[serde(default = "default_calibration_timeout_ms")]
    pub timeout_ms: Millis,
    /// Velocity below which the joint counts as still.
    #[serde(default = "default_velocity_epsilon")]
    pub velocity_epsilon: f32,
    /// Consecutive still cycles required to accept the stop.
    #[serde(default = "default_settle_cycles")]
    pub settle_cycles: u32,
    /// Joints are not judged still before this much push time.
    #[serde(default = "default_min_push_ms")]
    pub min_push_ms: Millis,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            torque: default_calibration_torque(),
            timeout_ms: default_calibration_timeout_ms(),
            velocity_epsilon: default_velocity_epsilon(),
            settle_cycles: default_settle_cycles(),
            min_push_ms: default_min_push_ms(),
        }
    }
}

/// `[commands]` parameters applied to host submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDefaults {
    #[serde(default = "default_position_tolerance")]
    pub position_tolerance: f32,
    #[serde(default = "default_position_timeout_ms")]
    pub position_timeout_ms: Millis,
    /// Duration of velocity and torque moves.
    #[serde(default = "default_move_duration_ms")]
    pub move_duration_ms: Millis,
}

impl Default for CommandDefaults {
    fn default() -> Self {
        Self {
            position_tolerance: default_position_tolerance(),
            position_timeout_ms: default_position_timeout_ms(),
            move_duration_ms: default_move_duration_ms(),
        }
    }
}

fn default_cycle_time_ms() -> Millis {
    CYCLE_TIME_MS
}
fn default_heartbeat_timeout_ms() -> Millis {
    HEARTBEAT_TIMEOUT_MS
}
fn default_discovery_timeout_ms() -> Millis {
    DISCOVERY_TIMEOUT_MS
}
fn default_enable_timeout_ms() -> Millis {
    ENABLE_TIMEOUT_MS
}
fn default_enable_poll_interval_ms() -> Millis {
    10
}
fn default_enable_retry_polls() -> u32 {
    15
}
fn default_safe_error_mask() -> u32 {
    DeviceError::SAFE_TO_CLEAR.bits()
}
fn default_calibration_torque() -> f32 {
    0.036
}
fn default_calibration_timeout_ms() -> Millis {
    10_000
}
fn default_velocity_epsilon() -> f32 {
    1e-4
}
fn default_settle_cycles() -> u32 {
    3
}
fn default_min_push_ms() -> Millis {
    100
}
fn default_position_tolerance() -> f32 {
    1e-3
}
fn default_position_timeout_ms() -> Millis {
    5000
}
fn default_move_duration_ms() -> Millis {
    500
}

// ─── Validation ─────────────────────────────────────────────────────

impl SupervisorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.supervisor.validate()?;
        validate_devices(&self.devices)?;
        self.calibration.validate()?;
        self.commands.validate()?;
        self.simulation.validate()
    }

    pub fn device(&self, id: DeviceId) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id == id)
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

impl LoopConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.cycle_time_ms) {
            return Err(invalid(format!(
                "supervisor.cycle_time_ms {} out of range [1, 1000]",
                self.cycle_time_ms
            )));
        }
        if self.heartbeat_timeout_ms <= self.cycle_time_ms {
            return Err(invalid(format!(
                "supervisor.heartbeat_timeout_ms {} must exceed cycle_time_ms {}",
                self.heartbeat_timeout_ms, self.cycle_time_ms
            )));
        }
        if self.discovery_timeout_ms == 0 || self.enable_timeout_ms == 0 {
            return Err(invalid("supervisor startup timeouts must be non-zero"));
        }
        if self.enable_poll_interval_ms == 0 || self.enable_retry_polls == 0 {
            return Err(invalid(
                "supervisor.enable_poll_interval_ms and enable_retry_polls must be non-zero",
            ));
        }
        Ok(())
    }
}

fn validate_devices(devices: &[DeviceConfig]) -> Result<(), ConfigError> {
    if devices.is_empty() || devices.len() > MAX_DEVICES {
        return Err(invalid(format!(
            "device count {} out of range [1, {MAX_DEVICES}]",
            devices.len()
        )));
    }
    let mut seen = HashSet::new();
    for dev in devices {
        if !seen.insert(dev.id) {
            return Err(invalid(format!("duplicate device id {}", dev.id)));
        }
        if dev.name.trim().is_empty() {
            return Err(invalid(format!("device {} has an empty name", dev.id)));
        }
    }
    Ok(())
}

impl CalibrationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.torque > 0.0 && self.torque.is_finite()) {
            return Err(invalid(format!(
                "calibration.torque {} must be positive",
                self.torque
            )));
        }
        if !(self.velocity_epsilon > 0.0) {
            return Err(invalid("calibration.velocity_epsilon must be positive"));
        }
        if self.settle_cycles == 0 {
            return Err(invalid("calibration.settle_cycles must be at least 1"));
        }
        if self.min_push_ms >= self.timeout_ms {
            return Err(invalid(format!(
                "calibration.min_push_ms {} must be below timeout_ms {}",
                self.min_push_ms, self.timeout_ms
            )));
        }
        Ok(())
    }
}

impl CommandDefaults {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.position_tolerance > 0.0) {
            return Err(invalid("commands.position_tolerance must be positive"));
        }
        if self.position_timeout_ms == 0 || self.move_duration_ms == 0 {
            return Err(invalid("commands durations must be non-zero"));
        }
        Ok(())
    }
}

// ─── Loading Functions ──────────────────────────────────────────────

/// Load and validate the supervisor configuration file.
pub fn load_config(path: &Path) -> Result<SupervisorConfig, ConfigError> {
    let config = SupervisorConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML string (for testing).
pub fn load_config_from_str(content: &str) -> Result<SupervisorConfig, ConfigError> {
    let config = SupervisorConfig::from_toml_str(content)?;
    config.validate()?;
    Ok(config)
}
