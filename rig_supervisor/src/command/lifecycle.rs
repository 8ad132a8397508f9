//! Command lifecycle: start → update* → end.
//!
//! A [`Command`] is one unit of scheduled work. Its behaviour is selected
//! by [`CommandKind`]; the lifecycle bookkeeping (started, ended,
//! timestamps) is shared and enforced here so every kind obeys the same
//! ordering rules:
//!
//! - `start` runs exactly once, before anything else.
//! - `update` runs only after `start` and only while not done.
//! - `end` runs exactly once, after `start`.
//! - `is_done` may be queried at any time after `start`.

use rig_common::bus::BusError;
use rig_common::consts::Millis;
use rig_common::device::DeviceId;
use thiserror::Error;
use tracing::{trace, warn};

use crate::actuator::Actuators;

/// Lifecycle misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("command already started")]
    AlreadyStarted,
    #[error("command not started")]
    NotStarted,
    #[error("command already done")]
    AlreadyDone,
    #[error("command already ended")]
    AlreadyEnded,
}

/// What a command does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandKind {
    /// Move to `target` and finish once within `tolerance`, or after
    /// `timeout_ms`.
    Position {
        device: DeviceId,
        target: f32,
        tolerance: f32,
        timeout_ms: Millis,
    },
    /// Hold `target` velocity for `duration_ms`, then stop.
    Velocity {
        device: DeviceId,
        target: f32,
        duration_ms: Millis,
    },
    /// Apply `target` torque for `duration_ms`, then release.
    Torque {
        device: DeviceId,
        target: f32,
        duration_ms: Millis,
    },
    /// Wait for `duration_ms` without driving anything.
    Dwell { duration_ms: Millis },
}

impl CommandKind {
    pub const fn device(&self) -> Option<DeviceId> {
        match self {
            Self::Position { device, .. }
            | Self::Velocity { device, .. }
            | Self::Torque { device, .. } => Some(*device),
            Self::Dwell { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Command {
    kind: CommandKind,
    parallelizable: bool,
    started: bool,
    ended: bool,
    start_time: Option<Millis>,
    end_time: Option<Millis>,
    /// Position commands only: finished because the deadline passed.
    timed_out: bool,
}

impl Command {
    pub fn new(kind: CommandKind, parallelizable: bool) -> Self {
        Self {
            kind,
            parallelizable,
            started: false,
            ended: false,
            start_time: None,
            end_time: None,
            timed_out: false,
        }
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn is_parallelizable(&self) -> bool {
        self.parallelizable
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    pub fn start_time(&self) -> Option<Millis> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<Millis> {
        self.end_time
    }

    /// True if the command ended at its deadline instead of reaching its goal.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Return to the never-started state.
    pub fn reset(&mut self) {
        self.started = false;
        self.ended = false;
        self.start_time = None;
        self.end_time = None;
        self.timed_out = false;
    }

    pub fn start(&mut self, now: Millis, io: &mut Actuators<'_>) -> Result<(), CommandError> {
        if self.started {
            return Err(CommandError::AlreadyStarted);
        }
        self.started = true;
        self.start_time = Some(now);
        trace!(kind = ?self.kind, now, "command start");

        if let Err(e) = self.send_setpoint(io) {
            warn!(kind = ?self.kind, "command setpoint not sent: {e}");
        }
        Ok(())
    }

    /// Send the setpoint again, e.g. after the drives were stopped while
    /// the command was running. Allowed only between `start` and `end`.
    pub fn reassert(&self, io: &mut Actuators<'_>) -> Result<(), CommandError> {
        if !self.started {
            return Err(CommandError::NotStarted);
        }
        if self.ended {
            return Err(CommandError::AlreadyEnded);
        }
        if let Err(e) = self.send_setpoint(io) {
            warn!(kind = ?self.kind, "command setpoint not re-sent: {e}");
        }
        Ok(())
    }

    fn send_setpoint(&self, io: &mut Actuators<'_>) -> Result<(), BusError> {
        match self.kind {
            CommandKind::Position { device, target, .. } => {
                io.handle(device).set_position(target)
            }
            CommandKind::Velocity { device, target, .. } => {
                io.handle(device).set_velocity(target)
            }
            CommandKind::Torque { device, target, .. } => io.handle(device).set_torque(target),
            CommandKind::Dwell { .. } => Ok(()),
        }
    }

    /// Whether the command has reached its completion condition.
    ///
    /// Always false before `start`.
    pub fn is_done(&self, now: Millis, io: &Actuators<'_>) -> bool {
        let Some(started_at) = self.start_time else {
            return false;
        };
        if self.ended {
            return true;
        }
        let elapsed = now.saturating_sub(started_at);
        match self.kind {
            CommandKind::Position {
                device,
                target,
                tolerance,
                timeout_ms,
            } => {
                let reached = io
                    .device(device)
                    .and_then(|d| d.position())
                    .is_some_and(|p| (p - target).abs() <= tolerance);
                reached || elapsed >= timeout_ms
            }
            CommandKind::Velocity { duration_ms, .. }
            | CommandKind::Torque { duration_ms, .. }
            | CommandKind::Dwell { duration_ms } => elapsed >= duration_ms,
        }
    }

    /// Per-tick hook. Setpoints are latched by the drives, so no bus
    /// traffic is needed here.
    pub fn update(&mut self, now: Millis, io: &mut Actuators<'_>) -> Result<(), CommandError> {
        if !self.started {
            return Err(CommandError::NotStarted);
        }
        if self.ended || self.is_done(now, io) {
            return Err(CommandError::AlreadyDone);
        }
        Ok(())
    }

    pub fn end(&mut self, now: Millis, io: &mut Actuators<'_>) -> Result<(), CommandError> {
        if !self.started {
            return Err(CommandError::NotStarted);
        }
        if self.ended {
            return Err(CommandError::AlreadyEnded);
        }

        let sent = match self.kind {
            CommandKind::Position {
                device,
                target,
                tolerance,
                ..
            } => {
                let reached = io
                    .device(device)
                    .and_then(|d| d.position())
                    .is_some_and(|p| (p - target).abs() <= tolerance);
                if !reached {
                    self.timed_out = true;
                    warn!(device, target, "position not reached before deadline");
                }
                Ok(())
            }
            CommandKind::Velocity { device, .. } => io.handle(device).set_velocity(0.0),
            CommandKind::Torque { device, .. } => io.handle(device).set_torque(0.0),
            CommandKind::Dwell { .. } => Ok(()),
        };
        if let Err(e) = sent {
            warn!(kind = ?self.kind, "command stop not sent: {e}");
        }

        self.ended = true;
        self.end_time = Some(now);
        trace!(kind = ?self.kind, now, "command end");
        Ok(())
    }
}
