//! Joint zeroing by pushing against the mechanical stop.
//!
//! ## Procedure
//!
//! 1. Every joint is driven with a constant torque towards its configured
//!    calibration direction.
//! 2. After `min_push_ms`, a joint whose velocity stays within
//!    `velocity_epsilon` of zero (and of the previous sample) for
//!    `settle_cycles` consecutive ticks has reached its stop.
//! 3. The position at that moment is the joint's zero; torque is released.
//! 4. A joint that has not settled within `timeout_ms` is released and
//!    reported as timed out.
//!
//! All joints are calibrated concurrently. The routine finishes once
//! every joint has settled or timed out.

use heapless::Vec as HVec;
use rig_common::command::{CalibrationReport, JointOutcome};
use rig_common::consts::{MAX_DEVICES, Millis};
use rig_common::device::DeviceId;
use tracing::{debug, info, warn};

use crate::actuator::Actuators;
use crate::config::CalibrationConfig;

// ─── Joint Phases ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointPhase {
    /// Torque applied, waiting for the joint to stop.
    Pushing,
    /// Stop reached; zero recorded.
    Settled { zero_position: f32 },
    TimedOut,
    Aborted,
}

impl JointPhase {
    pub const fn is_finished(&self) -> bool {
        !matches!(self, Self::Pushing)
    }

    const fn outcome(&self) -> Option<JointOutcome> {
        match *self {
            Self::Pushing => None,
            Self::Settled { zero_position } => Some(JointOutcome::Settled { zero_position }),
            Self::TimedOut => Some(JointOutcome::TimedOut),
            Self::Aborted => Some(JointOutcome::Aborted),
        }
    }
}

// ─── Joint Calibrator ───────────────────────────────────────────────

/// Stop detection for one joint.
#[derive(Debug, Clone)]
pub struct JointCalibrator {
    device: DeviceId,
    /// Signed push torque.
    torque: f32,
    started_at: Millis,
    timeout_ms: Millis,
    min_push_ms: Millis,
    velocity_epsilon: f32,
    settle_cycles: u32,
    still_cycles: u32,
    previous_velocity: Option<f32>,
    phase: JointPhase,
}

impl JointCalibrator {
    pub fn new(device: DeviceId, direction_sign: f32, config: &CalibrationConfig, now: Millis) -> Self {
        Self {
            device,
            torque: direction_sign * config.torque,
            started_at: now,
            timeout_ms: config.timeout_ms,
            min_push_ms: config.min_push_ms,
            velocity_epsilon: config.velocity_epsilon,
            settle_cycles: config.settle_cycles,
            still_cycles: 0,
            previous_velocity: None,
            phase: JointPhase::Pushing,
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn phase(&self) -> JointPhase {
        self.phase
    }

    pub fn tick(&mut self, now: Millis, io: &mut Actuators<'_>) -> JointPhase {
        if self.phase.is_finished() {
            return self.phase;
        }

        let elapsed = now.saturating_sub(self.started_at);
        let mut handle = io.handle(self.device);

        if elapsed >= self.timeout_ms {
            if let Err(e) = handle.set_torque(0.0) {
                warn!(device = self.device, "torque release failed: {e}");
            }
            warn!(device = self.device, elapsed, "joint did not settle");
            self.phase = JointPhase::TimedOut;
            return self.phase;
        }

        let velocity = handle.velocity();
        let still = match (velocity, self.previous_velocity) {
            (Some(v), Some(prev)) => {
                v.abs() <= self.velocity_epsilon && (v - prev).abs() <= self.velocity_epsilon
            }
            _ => false,
        };
        self.previous_velocity = velocity;

        if elapsed >= self.min_push_ms && still {
            self.still_cycles += 1;
        } else {
            self.still_cycles = 0;
        }

        if self.still_cycles >= self.settle_cycles {
            let zero_position = handle.position().unwrap_or(0.0);
            if let Err(e) = handle.set_torque(0.0) {
                warn!(device = self.device, "torque release failed: {e}");
            }
            info!(device = self.device, zero_position, elapsed, "joint settled");
            self.phase = JointPhase::Settled { zero_position };
            return self.phase;
        }

        if let Err(e) = handle.set_torque(self.torque) {
            debug!(device = self.device, "push torque not sent: {e}");
        }
        self.phase
    }

    fn abort(&mut self, io: &mut Actuators<'_>) {
        if self.phase.is_finished() {
            return;
        }
        if let Err(e) = io.handle(self.device).set_torque(0.0) {
            warn!(device = self.device, "torque release failed: {e}");
        }
        self.phase = JointPhase::Aborted;
    }
}

// ─── Calibration Routine ────────────────────────────────────────────

/// Concurrent calibration of every joint.
#[derive(Debug, Clone)]
pub struct CalibrationRoutine {
    joints: HVec<JointCalibrator, MAX_DEVICES>,
    started_at: Millis,
}

impl CalibrationRoutine {
    pub fn new(
        joints: impl IntoIterator<Item = (DeviceId, f32)>,
        config: &CalibrationConfig,
        now: Millis,
    ) -> Self {
        let mut table = HVec::new();
        for (device, sign) in joints {
            if table.push(JointCalibrator::new(device, sign, config, now)).is_err() {
                warn!(device, "calibration table full, joint skipped");
            }
        }
        info!(joints = table.len(), "calibration started");
        Self {
            joints: table,
            started_at: now,
        }
    }

    pub fn joints(&self) -> &[JointCalibrator] {
        &self.joints
    }

    /// Advance every joint. Returns the report once all have finished.
    pub fn tick(&mut self, now: Millis, io: &mut Actuators<'_>) -> Option<CalibrationReport> {
        let mut finished = true;
        for joint in self.joints.iter_mut() {
            finished &= joint.tick(now, io).is_finished();
        }
        finished.then(|| self.report(now))
    }

    /// Release every joint still pushing and report failure.
    pub fn abort(&mut self, now: Millis, io: &mut Actuators<'_>) -> CalibrationReport {
        for joint in self.joints.iter_mut() {
            joint.abort(io);
        }
        warn!("calibration aborted");
        self.report(now)
    }

    fn report(&self, now: Millis) -> CalibrationReport {
        let mut joints = HVec::new();
        for j in &self.joints {
            if let Some(outcome) = j.phase.outcome() {
                let _ = joints.push((j.device, outcome));
            }
        }
        let success = !joints.is_empty() && joints.iter().all(|(_, o)| o.is_settled());
        CalibrationReport {
            success,
            elapsed_ms: now.saturating_sub(self.started_at),
            joints,
        }
    }
}
