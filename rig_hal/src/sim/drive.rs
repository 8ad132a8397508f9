//! Single-joint drive simulator.
//!
//! Models one actuator controller and the joint it drives:
//! - Axis state: idle until a closed-loop request is accepted and armed
//! - Error word: latched faults, ESTOP_REQUESTED on e-stop
//! - Dynamics: torque-driven inertia with viscous friction and hard stops
//! - Control: torque passthrough, proportional velocity loop, PD position loop

use rig_common::bus::BusEvent;
use rig_common::consts::Millis;
use rig_common::device::{ControlMode, DeviceError, DeviceId};
use tracing::{debug, trace};

use super::SimConfig;

/// Longest interval integrated in one poll; longer gaps are truncated.
const MAX_STEP_MS: Millis = 50;

/// Temperature rise per squared unit of torque at steady state.
const HEATING_PER_TORQUE_SQ: f32 = 2000.0;

/// Thermal time constant [s].
const THERMAL_TAU_S: f32 = 10.0;

/// Active control target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setpoint {
    Torque(f32),
    Velocity(f32),
    Position(f32),
}

/// One simulated controller plus joint.
#[derive(Debug, Clone)]
pub struct DriveSimulator {
    id: DeviceId,
    config: SimConfig,
    mode: ControlMode,
    error_code: u32,
    position: f32,
    velocity: f32,
    setpoint: Setpoint,
    /// Time at which a pending closed-loop request takes effect.
    arm_at: Option<Millis>,
    silent: bool,
    last_step: Option<Millis>,
    last_heartbeat: Option<Millis>,
    temperature: f32,
}

impl DriveSimulator {
    pub fn new(id: DeviceId, config: SimConfig) -> Self {
        let temperature = config.ambient_temperature;
        Self {
            id,
            config,
            mode: ControlMode::Idle,
            error_code: 0,
            position: 0.0,
            velocity: 0.0,
            setpoint: Setpoint::Torque(0.0),
            arm_at: None,
            silent: false,
            last_step: None,
            last_heartbeat: None,
            temperature,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn error_code(&self) -> u32 {
        self.error_code
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn setpoint(&self) -> Setpoint {
        self.setpoint
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Place the joint (for test setup).
    pub fn set_position(&mut self, position: f32) {
        let limit = self.config.joint_limit;
        self.position = position.clamp(-limit, limit);
        self.velocity = 0.0;
    }

    // ─── Commands ───────────────────────────────────────────────────

    /// Axis state request received at `now`.
    pub fn request_state(&mut self, mode: ControlMode, now: Millis) {
        match mode {
            ControlMode::ClosedLoop => {
                if self.error_code != 0 {
                    debug!(
                        device = self.id,
                        code = self.error_code,
                        "closed-loop request refused while faulted"
                    );
                    return;
                }
                if self.mode != ControlMode::ClosedLoop && self.arm_at.is_none() {
                    self.arm_at = Some(now + self.config.arm_delay_ms);
                }
            }
            ControlMode::Idle => self.disarm(),
            other => {
                self.arm_at = None;
                self.mode = other;
            }
        }
    }

    pub fn set_setpoint(&mut self, setpoint: Setpoint) {
        self.setpoint = setpoint;
    }

    pub fn estop(&mut self) {
        self.error_code |= DeviceError::ESTOP_REQUESTED.bits();
        self.disarm();
        debug!(device = self.id, "e-stop latched");
    }

    /// Returns false if the drive is not answering.
    pub fn clear_errors(&mut self) -> bool {
        if self.silent {
            return false;
        }
        self.error_code = 0;
        true
    }

    /// Latch `code` and disarm, as the controller does on a fault.
    pub fn inject_error(&mut self, code: u32) {
        self.error_code |= code;
        self.disarm();
    }

    /// Stop (or resume) all outgoing frames.
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Controller reset: errors cleared, idle, talking again. The joint
    /// keeps its position.
    pub fn power_cycle(&mut self) {
        self.error_code = 0;
        self.silent = false;
        self.last_heartbeat = None;
        self.disarm();
    }

    fn disarm(&mut self) {
        self.mode = ControlMode::Idle;
        self.arm_at = None;
        self.setpoint = Setpoint::Torque(0.0);
    }

    // ─── Simulation ─────────────────────────────────────────────────

    /// Advance the joint to `now`.
    pub fn step(&mut self, now: Millis) {
        if self.arm_at.is_some_and(|at| now >= at) {
            self.arm_at = None;
            self.mode = ControlMode::ClosedLoop;
            self.setpoint = Setpoint::Torque(0.0);
            debug!(device = self.id, "closed loop armed");
        }

        let Some(last) = self.last_step.replace(now) else {
            return;
        };
        let elapsed = now.saturating_sub(last).min(MAX_STEP_MS);
        for _ in 0..elapsed {
            self.integrate(0.001);
        }

        trace!(
            device = self.id,
            position = self.position,
            velocity = self.velocity,
            "drive step"
        );
    }

    fn motor_torque(&self) -> f32 {
        if self.mode != ControlMode::ClosedLoop {
            return 0.0;
        }
        match self.setpoint {
            Setpoint::Torque(t) => t,
            Setpoint::Velocity(v) => self.config.velocity_gain * (v - self.velocity),
            Setpoint::Position(p) => {
                self.config.position_kp * (p - self.position) - self.config.position_kd * self.velocity
            }
        }
    }

    fn integrate(&mut self, dt: f32) {
        let torque = self.motor_torque();
        let accel = (torque - self.config.damping * self.velocity) / self.config.inertia;
        self.velocity += accel * dt;
        self.position += self.velocity * dt;

        let limit = self.config.joint_limit;
        if self.position > limit {
            self.position = limit;
            self.velocity = self.velocity.min(0.0);
        } else if self.position < -limit {
            self.position = -limit;
            self.velocity = self.velocity.max(0.0);
        }

        let target = self.config.ambient_temperature + HEATING_PER_TORQUE_SQ * torque * torque;
        self.temperature += (target - self.temperature) * dt / THERMAL_TAU_S;
    }

    /// Frames the controller sends at `now`: feedback every poll,
    /// heartbeat and temperature once per heartbeat interval.
    pub fn emit(&mut self, now: Millis, sink: &mut dyn FnMut(BusEvent)) {
        if self.silent {
            return;
        }
        let due = self
            .last_heartbeat
            .is_none_or(|t| now.saturating_sub(t) >= self.config.heartbeat_interval_ms);
        if due {
            self.last_heartbeat = Some(now);
            sink(BusEvent::Heartbeat {
                device: self.id,
                error_code: self.error_code,
                control_mode: self.mode,
            });
            sink(BusEvent::Temperature {
                device: self.id,
                motor_temperature: self.temperature,
            });
        }
        sink(BusEvent::Feedback {
            device: self.id,
            position: self.position,
            velocity: self.velocity,
        });
    }
}
