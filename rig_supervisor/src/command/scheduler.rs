//! Command scheduler: batch execution and calibration mode.
//!
//! ## Batch mode
//!
//! The queue is consumed slice by slice (see [`CommandSlice`]). Each tick,
//! every command of the current slice is started if new, updated while
//! running, and ended once done. When every command of the slice has
//! ended, the next tick computes the following slice. When no slice is
//! left, one [`ExecutionStats`] is published and execution stops.
//!
//! ## Calibration mode
//!
//! While a [`CalibrationRoutine`] is active, batch ticking is suppressed.
//! Batch execution and calibration are mutually exclusive.
//!
//! The scheduler never decides whether motion is allowed; its owner only
//! ticks it while the rig is `Active`, calls [`CommandScheduler::resume`]
//! when the rig re-enters `Active`, and calls [`CommandScheduler::abort`]
//! when the rig faults.

use heapless::Vec as HVec;
use rig_common::command::{CalibrationReport, ControlType, ExecutionStats};
use rig_common::consts::{MAX_COMMANDS, Millis};
use rig_common::device::DeviceId;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::calibration::CalibrationRoutine;
use super::lifecycle::{Command, CommandKind};
use super::slice::CommandSlice;
use crate::actuator::Actuators;
use crate::config::{CalibrationConfig, CommandDefaults};

/// Scheduler misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("a batch is already executing")]
    AlreadyExecuting,
    #[error("calibration in progress")]
    Calibrating,
    #[error("not allowed while a batch is executing")]
    Executing,
    #[error("command queue full")]
    QueueFull,
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerTick {
    Idle,
    Executing,
    Completed(ExecutionStats),
    Calibrating,
    CalibrationFinished(CalibrationReport),
}

pub type ExecutionObserver = Box<dyn FnMut(&ExecutionStats)>;
pub type CalibrationObserver = Box<dyn FnMut(&CalibrationReport)>;

pub struct CommandScheduler {
    queue: HVec<Command, MAX_COMMANDS>,
    current: CommandSlice,
    /// Start of the next slice to compute.
    cursor: usize,
    completed_in_slice: usize,
    executed_count: usize,
    executing: bool,
    started_at: Millis,
    calibration: Option<CalibrationRoutine>,
    calibration_config: CalibrationConfig,
    defaults: CommandDefaults,
    execution_observers: Vec<ExecutionObserver>,
    calibration_observers: Vec<CalibrationObserver>,
}

impl CommandScheduler {
    pub fn new(defaults: CommandDefaults, calibration_config: CalibrationConfig) -> Self {
        Self {
            queue: HVec::new(),
            current: CommandSlice::EMPTY,
            cursor: 0,
            completed_in_slice: 0,
            executed_count: 0,
            executing: false,
            started_at: 0,
            calibration: None,
            calibration_config,
            defaults,
            execution_observers: Vec::new(),
            calibration_observers: Vec::new(),
        }
    }

    // ─── Observers ──────────────────────────────────────────────────

    pub fn on_execution_complete(&mut self, observer: impl FnMut(&ExecutionStats) + 'static) {
        self.execution_observers.push(Box::new(observer));
    }

    pub fn on_calibration_complete(&mut self, observer: impl FnMut(&CalibrationReport) + 'static) {
        self.calibration_observers.push(Box::new(observer));
    }

    fn publish_stats(&mut self, stats: &ExecutionStats) {
        for observer in self.execution_observers.iter_mut() {
            observer(stats);
        }
    }

    fn publish_report(&mut self, report: &CalibrationReport) {
        for observer in self.calibration_observers.iter_mut() {
            observer(report);
        }
    }

    // ─── Queries ────────────────────────────────────────────────────

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.queue
    }

    pub fn current_slice(&self) -> CommandSlice {
        self.current
    }

    pub fn executed_count(&self) -> usize {
        self.executed_count
    }

    /// The slice that would start at `from` in the current queue.
    pub fn find_next_slice(&self, from: usize) -> CommandSlice {
        CommandSlice::next(from, self.queue.len(), |i| self.queue[i].is_parallelizable())
    }

    // ─── Queue Management ───────────────────────────────────────────

    pub fn add_command(&mut self, command: Command) -> Result<(), SchedulerError> {
        if self.executing {
            warn!("command rejected: batch executing");
            return Err(SchedulerError::Executing);
        }
        if self.is_calibrating() {
            warn!("command rejected: calibrating");
            return Err(SchedulerError::Calibrating);
        }
        self.queue.push(command).map_err(|_| {
            warn!(capacity = MAX_COMMANDS, "command rejected: queue full");
            SchedulerError::QueueFull
        })
    }

    /// Build a command from a host request using the configured defaults.
    pub fn submit(
        &mut self,
        control: ControlType,
        device: DeviceId,
        value: f32,
        parallelizable: bool,
    ) -> Result<(), SchedulerError> {
        let d = &self.defaults;
        let kind = match control {
            ControlType::Position => CommandKind::Position {
                device,
                target: value,
                tolerance: d.position_tolerance,
                timeout_ms: d.position_timeout_ms,
            },
            ControlType::Velocity => CommandKind::Velocity {
                device,
                target: value,
                duration_ms: d.move_duration_ms,
            },
            ControlType::Torque => CommandKind::Torque {
                device,
                target: value,
                duration_ms: d.move_duration_ms,
            },
        };
        self.add_command(Command::new(kind, parallelizable))
    }

    /// Drop every queued command without running end hooks.
    ///
    /// An executing batch is abandoned and reported as unsuccessful.
    pub fn clear(&mut self, now: Millis) {
        if self.executing {
            warn!(
                in_flight = self.current.size(),
                "clearing queue during execution"
            );
            self.finish(now, false);
        }
        self.queue.clear();
        self.rewind();
    }

    /// Return every queued command to its never-started state.
    pub fn reset(&mut self) -> Result<(), SchedulerError> {
        if self.executing {
            warn!("reset rejected: batch executing");
            return Err(SchedulerError::Executing);
        }
        for cmd in self.queue.iter_mut() {
            cmd.reset();
        }
        self.rewind();
        Ok(())
    }

    fn rewind(&mut self) {
        self.current = CommandSlice::EMPTY;
        self.cursor = 0;
        self.completed_in_slice = 0;
    }

    // ─── Mode Control ───────────────────────────────────────────────

    pub fn start_execution(&mut self, now: Millis) -> Result<(), SchedulerError> {
        if self.executing {
            warn!("start rejected: batch already executing");
            return Err(SchedulerError::AlreadyExecuting);
        }
        if self.is_calibrating() {
            warn!("start rejected: calibrating");
            return Err(SchedulerError::Calibrating);
        }
        self.rewind();
        self.executing = true;
        self.executed_count = 0;
        self.started_at = now;
        info!(commands = self.queue.len(), "batch execution started");
        Ok(())
    }

    /// Enter calibration mode for the given `(device, direction sign)` pairs.
    pub fn calibrate(
        &mut self,
        now: Millis,
        joints: impl IntoIterator<Item = (DeviceId, f32)>,
    ) -> Result<(), SchedulerError> {
        if self.executing {
            warn!("calibration rejected: batch executing");
            return Err(SchedulerError::Executing);
        }
        if self.is_calibrating() {
            warn!("calibration rejected: already calibrating");
            return Err(SchedulerError::Calibrating);
        }
        self.calibration = Some(CalibrationRoutine::new(joints, &self.calibration_config, now));
        Ok(())
    }

    /// Stop batch execution and calibration after a safety fault.
    ///
    /// The queue is kept. Returns true if anything was running.
    pub fn abort(&mut self, now: Millis, io: &mut Actuators<'_>) -> bool {
        let mut aborted = false;
        if let Some(mut routine) = self.calibration.take() {
            let report = routine.abort(now, io);
            self.publish_report(&report);
            aborted = true;
        }
        if self.executing {
            warn!(
                executed = self.executed_count,
                total = self.queue.len(),
                "batch aborted"
            );
            self.finish(now, false);
            aborted = true;
        }
        aborted
    }

    /// Re-send the setpoints of the commands still running in the current
    /// slice. Calibration pushes every tick and needs nothing here.
    pub fn resume(&mut self, io: &mut Actuators<'_>) {
        if !self.executing || self.current.is_empty() {
            return;
        }
        let mut resumed = 0;
        for cmd in self.queue[self.current.range()].iter() {
            if !cmd.has_started() || cmd.has_ended() {
                continue;
            }
            match cmd.reassert(io) {
                Ok(()) => resumed += 1,
                Err(e) => warn!(kind = ?cmd.kind(), "command not resumed: {e}"),
            }
        }
        debug!(resumed, "batch resumed");
    }

    fn finish(&mut self, now: Millis, success: bool) -> ExecutionStats {
        let stats = ExecutionStats {
            elapsed_ms: now.saturating_sub(self.started_at),
            executed_count: self.executed_count,
            success,
        };
        self.executing = false;
        self.current = CommandSlice::EMPTY;
        self.publish_stats(&stats);
        stats
    }

    // ─── Tick ───────────────────────────────────────────────────────

    pub fn tick(&mut self, now: Millis, io: &mut Actuators<'_>) -> SchedulerTick {
        if let Some(routine) = self.calibration.as_mut() {
            return match routine.tick(now, io) {
                Some(report) => {
                    self.calibration = None;
                    info!(
                        success = report.success,
                        elapsed_ms = report.elapsed_ms,
                        "calibration finished"
                    );
                    self.publish_report(&report);
                    SchedulerTick::CalibrationFinished(report)
                }
                None => SchedulerTick::Calibrating,
            };
        }

        if !self.executing {
            return SchedulerTick::Idle;
        }

        if self.current.is_empty() {
            self.current = self.find_next_slice(self.cursor);
            if self.current.is_empty() {
                let success = self.queue.iter().all(|c| !c.timed_out());
                let stats = self.finish(now, success);
                info!(
                    executed = stats.executed_count,
                    elapsed_ms = stats.elapsed_ms,
                    success,
                    "batch execution complete"
                );
                return SchedulerTick::Completed(stats);
            }
            // Commands that ended in an earlier run count as complete.
            self.completed_in_slice = self.queue[self.current.range()]
                .iter()
                .filter(|c| c.has_ended())
                .count();
            debug!(
                start = self.current.start(),
                end = self.current.end(),
                "slice started"
            );
        }

        for cmd in self.queue[self.current.range()].iter_mut() {
            if cmd.has_ended() {
                continue;
            }
            if !cmd.has_started() {
                if let Err(e) = cmd.start(now, io) {
                    warn!(kind = ?cmd.kind(), "command start rejected: {e}");
                }
            }
            if cmd.is_done(now, io) {
                if let Err(e) = cmd.end(now, io) {
                    warn!(kind = ?cmd.kind(), "command end rejected: {e}");
                }
                self.completed_in_slice += 1;
                self.executed_count += 1;
            } else if let Err(e) = cmd.update(now, io) {
                warn!(kind = ?cmd.kind(), "command update rejected: {e}");
            }
        }

        if self.completed_in_slice >= self.current.size() {
            debug!(end = self.current.end(), "slice complete");
            self.cursor = self.current.end();
            self.current = CommandSlice::EMPTY;
            self.completed_in_slice = 0;
        }
        SchedulerTick::Executing
    }
}

impl std::fmt::Debug for CommandScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandScheduler")
            .field("queued", &self.queue.len())
            .field("current", &self.current)
            .field("executing", &self.executing)
            .field("calibrating", &self.is_calibrating())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::DeviceHealthMonitor;
    use crate::testing::{RecordingBus, Sent};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn scheduler() -> CommandScheduler {
        CommandScheduler::new(CommandDefaults::default(), CalibrationConfig::default())
    }

    fn rig() -> (RecordingBus, DeviceHealthMonitor) {
        (
            RecordingBus::new(&[0, 1]),
            DeviceHealthMonitor::new(1000, 0, [(0, "proximal"), (1, "distal")]),
        )
    }

    fn dwell(ms: Millis, parallel: bool) -> Command {
        Command::new(CommandKind::Dwell { duration_ms: ms }, parallel)
    }

    fn collect_stats(s: &mut CommandScheduler) -> Rc<RefCell<Vec<ExecutionStats>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        s.on_execution_complete(move |stats| sink.borrow_mut().push(*stats));
        seen
    }

    /// Tick every `step` ms until idle or `limit` is reached.
    fn run(
        s: &mut CommandScheduler,
        bus: &mut RecordingBus,
        mon: &DeviceHealthMonitor,
        mut now: Millis,
        step: Millis,
        limit: Millis,
    ) -> Millis {
        while now <= limit {
            let mut io = Actuators::new(&mut *bus, mon);
            match s.tick(now, &mut io) {
                SchedulerTick::Completed(_) | SchedulerTick::CalibrationFinished(_) => return now,
                _ => now += step,
            }
        }
        now
    }

    #[test]
    fn start_while_executing_is_rejected() {
        let mut s = scheduler();
        s.add_command(dwell(10, false)).unwrap();
        s.start_execution(0).unwrap();
        assert_eq!(s.start_execution(1), Err(SchedulerError::AlreadyExecuting));
        assert!(s.is_executing());
    }

    #[test]
    fn empty_batch_completes_on_first_tick() {
        let (mut bus, mon) = rig();
        let mut s = scheduler();
        let seen = collect_stats(&mut s);
        s.start_execution(5).unwrap();
        let mut io = Actuators::new(&mut bus, &mon);
        let tick = s.tick(5, &mut io);
        assert_eq!(
            tick,
            SchedulerTick::Completed(ExecutionStats {
                elapsed_ms: 0,
                executed_count: 0,
                success: true
            })
        );
        assert_eq!(seen.borrow().len(), 1);
        assert!(!s.is_executing());
    }

    #[test]
    fn sequential_commands_run_one_slice_each() {
        let (mut bus, mon) = rig();
        let mut s = scheduler();
        let seen = collect_stats(&mut s);
        for _ in 0..3 {
            s.add_command(dwell(20, false)).unwrap();
        }
        s.start_execution(0).unwrap();

        let mut io = Actuators::new(&mut bus, &mon);
        s.tick(0, &mut io);
        assert_eq!(s.current_slice(), CommandSlice::new(0, 1));
        assert!(s.commands()[0].has_started());
        assert!(!s.commands()[1].has_started());
        drop(io);

        let done_at = run(&mut s, &mut bus, &mon, 10, 10, 1000);
        let stats = seen.borrow()[0];
        assert!(stats.success);
        assert_eq!(stats.executed_count, 3);
        // Each slice ends on the tick its dwell expires; the next starts a tick later.
        assert_eq!(done_at, 90);
        assert!(s.commands().iter().all(Command::has_ended));
    }

    #[test]
    fn parallel_group_starts_together() {
        let (mut bus, mon) = rig();
        let mut s = scheduler();
        s.submit(ControlType::Torque, 0, 0.01, true).unwrap();
        s.submit(ControlType::Torque, 1, -0.01, false).unwrap();
        s.add_command(dwell(10, false)).unwrap();
        s.start_execution(0).unwrap();

        let mut io = Actuators::new(&mut bus, &mon);
        s.tick(0, &mut io);
        drop(io);
        assert_eq!(s.current_slice(), CommandSlice::new(0, 2));
        assert_eq!(bus.sent, vec![Sent::Torque(0, 0.01), Sent::Torque(1, -0.01)]);
        assert!(!s.commands()[2].has_started());
    }

    #[test]
    fn each_command_ends_exactly_once() {
        let (mut bus, mon) = rig();
        let mut s = scheduler();
        let seen = collect_stats(&mut s);
        s.submit(ControlType::Velocity, 0, 1.0, true).unwrap();
        s.submit(ControlType::Velocity, 1, 1.0, true).unwrap();
        s.start_execution(0).unwrap();
        run(&mut s, &mut bus, &mon, 0, 50, 5000);

        let stops = bus
            .sent
            .iter()
            .filter(|m| matches!(m, Sent::Velocity(_, v) if *v == 0.0))
            .count();
        assert_eq!(stops, 2);
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0].executed_count, 2);
    }

    #[test]
    fn commands_rejected_while_executing() {
        let mut s = scheduler();
        s.start_execution(0).unwrap();
        assert_eq!(s.add_command(dwell(1, false)), Err(SchedulerError::Executing));
        assert_eq!(s.reset(), Err(SchedulerError::Executing));
    }

    #[test]
    fn queue_capacity_is_enforced() {
        let mut s = scheduler();
        for _ in 0..MAX_COMMANDS {
            s.add_command(dwell(1, true)).unwrap();
        }
        assert_eq!(s.add_command(dwell(1, true)), Err(SchedulerError::QueueFull));
    }

    #[test]
    fn clear_is_idempotent() {
        let mut s = scheduler();
        s.add_command(dwell(1, false)).unwrap();
        s.clear(0);
        assert!(s.is_empty());
        assert_eq!(s.current_slice(), CommandSlice::EMPTY);
        s.clear(0);
        assert!(s.is_empty());
        assert!(!s.is_executing());
    }

    #[test]
    fn clear_during_execution_reports_failure_without_end_hooks() {
        let (mut bus, mon) = rig();
        let mut s = scheduler();
        let seen = collect_stats(&mut s);
        s.submit(ControlType::Torque, 0, 0.02, false).unwrap();
        s.start_execution(0).unwrap();
        let mut io = Actuators::new(&mut bus, &mon);
        s.tick(0, &mut io);
        drop(io);
        s.clear(10);
        assert!(!s.is_executing());
        assert!(!seen.borrow()[0].success);
        // Only the start setpoint went out.
        assert_eq!(bus.sent, vec![Sent::Torque(0, 0.02)]);
    }

    #[test]
    fn resume_resends_running_setpoints_only() {
        let (mut bus, mon) = rig();
        let mut s = scheduler();
        s.submit(ControlType::Torque, 0, 0.02, true).unwrap();
        s.add_command(dwell(5, true)).unwrap();
        s.submit(ControlType::Velocity, 1, 0.5, false).unwrap();
        let mut io = Actuators::new(&mut bus, &mon);
        s.resume(&mut io);
        s.start_execution(0).unwrap();
        s.tick(0, &mut io);
        // The dwell finishes; the torque and velocity commands keep running.
        s.tick(5, &mut io);
        s.resume(&mut io);
        drop(io);
        assert_eq!(
            bus.sent,
            vec![
                Sent::Torque(0, 0.02),
                Sent::Velocity(1, 0.5),
                Sent::Torque(0, 0.02),
                Sent::Velocity(1, 0.5),
            ]
        );
    }

    #[test]
    fn reset_allows_second_run() {
        let (mut bus, mon) = rig();
        let mut s = scheduler();
        let seen = collect_stats(&mut s);
        s.add_command(dwell(10, false)).unwrap();
        s.start_execution(0).unwrap();
        let t = run(&mut s, &mut bus, &mon, 0, 10, 1000);

        s.reset().unwrap();
        assert!(s.commands().iter().all(|c| !c.has_started()));
        s.start_execution(t).unwrap();
        run(&mut s, &mut bus, &mon, t, 10, t + 1000);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].executed_count, 1);
    }

    #[test]
    fn rerun_without_reset_executes_nothing() {
        let (mut bus, mon) = rig();
        let mut s = scheduler();
        let seen = collect_stats(&mut s);
        s.add_command(dwell(10, false)).unwrap();
        s.start_execution(0).unwrap();
        let t = run(&mut s, &mut bus, &mon, 0, 10, 1000);
        s.start_execution(t).unwrap();
        run(&mut s, &mut bus, &mon, t, 10, t + 1000);
        assert_eq!(seen.borrow()[1].executed_count, 0);
    }

    #[test]
    fn abort_publishes_partial_stats_and_keeps_queue() {
        let (mut bus, mon) = rig();
        let mut s = scheduler();
        let seen = collect_stats(&mut s);
        s.add_command(dwell(10, false)).unwrap();
        s.add_command(dwell(1000, false)).unwrap();
        s.start_execution(0).unwrap();
        for now in [0, 10, 20, 30] {
            let mut io = Actuators::new(&mut bus, &mon);
            s.tick(now, &mut io);
        }
        let mut io = Actuators::new(&mut bus, &mon);
        assert!(s.abort(40, &mut io));
        assert!(!s.abort(41, &mut io));
        let stats = seen.borrow()[0];
        assert_eq!(stats.executed_count, 1);
        assert!(!stats.success);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn calibration_and_execution_are_exclusive() {
        let mut s = scheduler();
        s.calibrate(0, [(0, 1.0)]).unwrap();
        assert_eq!(s.start_execution(0), Err(SchedulerError::Calibrating));
        assert_eq!(s.calibrate(0, [(0, 1.0)]), Err(SchedulerError::Calibrating));
        assert_eq!(s.add_command(dwell(1, false)), Err(SchedulerError::Calibrating));

        let mut s = scheduler();
        s.start_execution(0).unwrap();
        assert_eq!(s.calibrate(0, [(0, 1.0)]), Err(SchedulerError::Executing));
    }

    #[test]
    fn calibration_suppresses_batch_and_publishes_report() {
        let (mut bus, mut mon) = rig();
        let mut s = scheduler();
        let reports = Rc::new(RefCell::new(Vec::new()));
        let sink = reports.clone();
        s.on_calibration_complete(move |r| sink.borrow_mut().push(r.clone()));
        s.calibrate(0, [(0, 1.0), (1, -1.0)]).unwrap();

        let mut now = 0;
        let mut last = SchedulerTick::Idle;
        while now < 1000 {
            now += 10;
            bus.push_feedback(0, 0.9, 0.0);
            bus.push_feedback(1, -0.9, 0.0);
            mon.pump(&mut bus, now);
            let mut io = Actuators::new(&mut bus, &mon);
            last = s.tick(now, &mut io);
            if !matches!(last, SchedulerTick::Calibrating) {
                break;
            }
        }
        assert!(matches!(last, SchedulerTick::CalibrationFinished(ref r) if r.success));
        assert!(!s.is_calibrating());
        assert_eq!(reports.borrow().len(), 1);
        assert_eq!(reports.borrow()[0].zero_position(1), Some(-0.9));
    }

    #[test]
    fn abort_fails_calibration() {
        let (mut bus, mon) = rig();
        let mut s = scheduler();
        let reports = Rc::new(RefCell::new(Vec::new()));
        let sink = reports.clone();
        s.on_calibration_complete(move |r| sink.borrow_mut().push(r.success));
        s.calibrate(0, [(0, 1.0)]).unwrap();
        let mut io = Actuators::new(&mut bus, &mon);
        s.tick(10, &mut io);
        assert!(s.abort(20, &mut io));
        assert_eq!(*reports.borrow(), vec![false]);
        assert!(!s.is_calibrating());
    }
}
