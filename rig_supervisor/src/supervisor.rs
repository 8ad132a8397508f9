//! The supervisor aggregate.
//!
//! Owns the bus, the health monitor, the safety state machine and the
//! scheduler, and runs them in a fixed order once per cycle:
//!
//! 1. Pump the bus into the health monitor and refresh timeouts.
//! 2. Aggregate faults.
//! 3. Advance the safety state machine, abort scheduled work on entering
//!    `Error`, and execute the transition's actions.
//! 4. Tick the scheduler, only while `Active`.
//!
//! Everything runs on the caller's thread; nothing here blocks except
//! [`Supervisor::startup`], whose waits are bounded.

use rig_common::bus::ActuatorBus;
use rig_common::command::{CalibrationReport, ControlType, ExecutionStats};
use rig_common::consts::Millis;
use rig_common::device::DeviceId;
use rig_common::state::SystemState;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::actuator::Actuators;
use crate::clock::Clock;
use crate::command::{Command, CommandScheduler, SchedulerError, SchedulerTick};
use crate::config::SupervisorConfig;
use crate::health::DeviceHealthMonitor;
use crate::safety::{
    ActionEffect, AdvanceResult, FaultReport, SafetyInputs, SafetyStateMachine, StatusLamps,
    actions, faults, lamp,
};
use crate::startup::{self, StartupError};

/// Result of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Continue,
    /// A reboot was requested; the owner must rebuild the supervisor.
    Reboot,
}

/// Snapshot published after each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SupervisorStatus {
    pub state: SystemState,
    pub timeout_mask: u8,
    pub executing: bool,
    pub calibrating: bool,
    pub queued: usize,
    pub cycle_count: u64,
    pub lamps: StatusLamps,
}

pub struct Supervisor<B: ActuatorBus> {
    config: SupervisorConfig,
    bus: B,
    monitor: DeviceHealthMonitor,
    safety: SafetyStateMachine,
    scheduler: CommandScheduler,
    inputs: SafetyInputs,
    last_report: FaultReport,
    cycle_count: u64,
}

impl<B: ActuatorBus> Supervisor<B> {
    pub fn new(config: SupervisorConfig, bus: B, now: Millis) -> Self {
        let monitor = DeviceHealthMonitor::new(
            config.supervisor.heartbeat_timeout_ms,
            now,
            config.devices.iter().map(|d| (d.id, d.name.as_str())),
        );
        let scheduler =
            CommandScheduler::new(config.commands.clone(), config.calibration.clone());
        info!(
            service = %config.shared.service_name,
            bus = bus.name(),
            devices = monitor.len(),
            "supervisor created"
        );
        Self {
            config,
            bus,
            monitor,
            safety: SafetyStateMachine::new(),
            scheduler,
            inputs: SafetyInputs::default(),
            last_report: FaultReport::default(),
            cycle_count: 0,
        }
    }

    /// Discover every device and bring it into closed-loop control.
    pub fn startup(&mut self, clock: &dyn Clock) -> Result<(), StartupError> {
        let cfg = &self.config.supervisor;
        startup::discover_devices(
            &mut self.bus,
            &mut self.monitor,
            clock,
            cfg.discovery_timeout_ms,
        )?;
        startup::enable_closed_loop(&mut self.bus, &mut self.monitor, clock, cfg)?;
        info!("startup complete");
        Ok(())
    }

    // ─── Cycle ──────────────────────────────────────────────────────

    pub fn cycle(&mut self, now: Millis) -> CycleOutcome {
        self.cycle_count += 1;
        self.monitor.pump(&mut self.bus, now);

        let safe_mask = self.config.supervisor.safe_error_mask;
        let report = faults::evaluate(&self.monitor, &self.inputs, self.safety.state(), safe_mask);
        self.last_report = report;

        let mut outcome = CycleOutcome::Continue;
        let advance = self.safety.advance(&report, self.inputs.deadman);
        if matches!(&advance, AdvanceResult::Changed(t) if t.to == SystemState::Error) {
            let mut io = Actuators::new(&mut self.bus, &self.monitor);
            self.scheduler.abort(now, &mut io);
        }
        for &action in advance.actions() {
            debug!(?action, "executing transition action");
            if actions::execute(action, &mut self.bus, &mut self.monitor, safe_mask)
                == ActionEffect::Reboot
            {
                outcome = CycleOutcome::Reboot;
            }
        }
        if matches!(&advance, AdvanceResult::Changed(t) if t.to == SystemState::Active) {
            // Leaving Active zeroed every drive; restore in-flight setpoints.
            let mut io = Actuators::new(&mut self.bus, &self.monitor);
            self.scheduler.resume(&mut io);
        }

        if outcome == CycleOutcome::Continue && self.safety.state().allows_motion() {
            let mut io = Actuators::new(&mut self.bus, &self.monitor);
            if let SchedulerTick::CalibrationFinished(report) = self.scheduler.tick(now, &mut io) {
                self.store_zero_offsets(&report);
            }
        }
        outcome
    }

    fn store_zero_offsets(&mut self, report: &CalibrationReport) {
        if !report.success {
            warn!("calibration failed, zero offsets unchanged");
            return;
        }
        for (id, _) in report.joints.iter() {
            if let Some(zero) = report.zero_position(*id) {
                self.monitor.set_zero_offset(*id, zero);
            }
        }
    }

    // ─── Operator Inputs ────────────────────────────────────────────

    pub fn set_estop(&mut self, asserted: bool) {
        if self.inputs.estop != asserted {
            info!(asserted, "e-stop input changed");
        }
        self.inputs.estop = asserted;
    }

    pub fn set_deadman(&mut self, held: bool) {
        if self.inputs.deadman != held {
            debug!(held, "deadman input changed");
        }
        self.inputs.deadman = held;
    }

    pub fn inputs(&self) -> SafetyInputs {
        self.inputs
    }

    // ─── Host Requests ──────────────────────────────────────────────

    pub fn submit(
        &mut self,
        control: ControlType,
        device: DeviceId,
        value: f32,
        parallelizable: bool,
    ) -> Result<(), SchedulerError> {
        if self.monitor.device(device).is_none() {
            warn!(device, "command for unknown device rejected");
            return Err(SchedulerError::UnknownDevice(device));
        }
        self.scheduler.submit(control, device, value, parallelizable)
    }

    pub fn add_command(&mut self, command: Command) -> Result<(), SchedulerError> {
        if let Some(device) = command.kind().device() {
            if self.monitor.device(device).is_none() {
                return Err(SchedulerError::UnknownDevice(device));
            }
        }
        self.scheduler.add_command(command)
    }

    pub fn start_execution(&mut self, now: Millis) -> Result<(), SchedulerError> {
        self.scheduler.start_execution(now)
    }

    /// Start calibrating every configured device towards its configured stop.
    pub fn calibrate(&mut self, now: Millis) -> Result<(), SchedulerError> {
        let joints = self
            .config
            .devices
            .iter()
            .map(|d| (d.id, d.calibration_direction.sign()));
        self.scheduler.calibrate(now, joints)
    }

    pub fn clear(&mut self, now: Millis) {
        self.scheduler.clear(now);
    }

    pub fn reset(&mut self) -> Result<(), SchedulerError> {
        self.scheduler.reset()
    }

    pub fn on_execution_complete(&mut self, observer: impl FnMut(&ExecutionStats) + 'static) {
        self.scheduler.on_execution_complete(observer);
    }

    pub fn on_calibration_complete(&mut self, observer: impl FnMut(&CalibrationReport) + 'static) {
        self.scheduler.on_calibration_complete(observer);
    }

    // ─── Accessors ──────────────────────────────────────────────────

    pub fn state(&self) -> SystemState {
        self.safety.state()
    }

    pub fn last_fault_report(&self) -> &FaultReport {
        &self.last_report
    }

    pub fn monitor(&self) -> &DeviceHealthMonitor {
        &self.monitor
    }

    pub fn scheduler(&self) -> &CommandScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Give the bus back, e.g. to rebuild the supervisor after a reboot.
    pub fn into_bus(self) -> B {
        self.bus
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn status(&self) -> SupervisorStatus {
        let timeout_mask = self.monitor.timeout_mask();
        SupervisorStatus {
            state: self.state(),
            timeout_mask,
            executing: self.scheduler.is_executing(),
            calibrating: self.scheduler.is_calibrating(),
            queued: self.scheduler.len(),
            cycle_count: self.cycle_count,
            lamps: lamp::status_lamps(self.state(), timeout_mask, self.monitor.len()),
        }
    }
}
