//! Simulation driver module.
//!
//! Software stand-in for the actuator controllers, used for development
//! and integration tests without a physical rig.

mod bus;
mod drive;

pub use bus::SimulatedBus;
pub use drive::{DriveSimulator, Setpoint};

use rig_common::config::ConfigError;
use rig_common::consts::Millis;
use serde::{Deserialize, Serialize};

/// `[simulation]` parameters of the simulated joints.
///
/// Every joint gets the same parameters. The joint travel is bounded by
/// hard stops at `±joint_limit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: Millis,
    /// Delay between a closed-loop request and the drive reporting it.
    #[serde(default = "default_arm_delay_ms")]
    pub arm_delay_ms: Millis,
    /// Rotor plus link inertia [kg·m²].
    #[serde(default = "default_inertia")]
    pub inertia: f32,
    /// Viscous friction [N·m·s/rad].
    #[serde(default = "default_damping")]
    pub damping: f32,
    /// Hard stop position [rad].
    #[serde(default = "default_joint_limit")]
    pub joint_limit: f32,
    #[serde(default = "default_position_kp")]
    pub position_kp: f32,
    #[serde(default = "default_position_kd")]
    pub position_kd: f32,
    #[serde(default = "default_velocity_gain")]
    pub velocity_gain: f32,
    #[serde(default = "default_ambient_temperature")]
    pub ambient_temperature: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            arm_delay_ms: default_arm_delay_ms(),
            inertia: default_inertia(),
            damping: default_damping(),
            joint_limit: default_joint_limit(),
            position_kp: default_position_kp(),
            position_kd: default_position_kd(),
            velocity_gain: default_velocity_gain(),
            ambient_temperature: default_ambient_temperature(),
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "simulation.heartbeat_interval_ms must be non-zero".into(),
            ));
        }
        let positive = [
            ("inertia", self.inertia),
            ("damping", self.damping),
            ("joint_limit", self.joint_limit),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::ValidationError(format!(
                    "simulation.{name} {value} must be positive"
                )));
            }
        }
        Ok(())
    }
}

fn default_heartbeat_interval_ms() -> Millis {
    100
}
fn default_arm_delay_ms() -> Millis {
    50
}
fn default_inertia() -> f32 {
    1e-4
}
fn default_damping() -> f32 {
    1e-3
}
fn default_joint_limit() -> f32 {
    1.0
}
fn default_position_kp() -> f32 {
    0.05
}
fn default_position_kd() -> f32 {
    0.005
}
fn default_velocity_gain() -> f32 {
    0.01
}
fn default_ambient_temperature() -> f32 {
    25.0
}
