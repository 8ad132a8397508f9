//! Batch execution and calibration driving the simulated joints.

use std::cell::RefCell;
use std::rc::Rc;

use rig_common::command::{CalibrationReport, ControlType, ExecutionStats};
use rig_common::device::DeviceError;
use rig_common::state::SystemState;
use rig_hal::sim::Setpoint;
use rig_supervisor::command::{Command, CommandKind, SchedulerError};

use super::rig::Rig;

fn record_stats(rig: &mut Rig) -> Rc<RefCell<Vec<ExecutionStats>>> {
    let stats = Rc::new(RefCell::new(Vec::new()));
    let sink = stats.clone();
    rig.sup
        .on_execution_complete(move |s| sink.borrow_mut().push(*s));
    stats
}

fn position(rig: &Rig, id: u8) -> f32 {
    rig.sup.monitor().device(id).unwrap().position().unwrap()
}

#[test]
fn batch_runs_slices_in_order() {
    let mut rig = Rig::active();
    let stats = record_stats(&mut rig);

    rig.sup.submit(ControlType::Position, 0, 0.2, true).unwrap();
    rig.sup.submit(ControlType::Position, 1, -0.2, false).unwrap();
    rig.sup.submit(ControlType::Velocity, 0, 0.5, false).unwrap();
    rig.sup.submit(ControlType::Position, 0, 0.0, true).unwrap();
    rig.sup.submit(ControlType::Position, 1, 0.0, false).unwrap();
    let now = rig.now();
    rig.sup.start_execution(now).unwrap();

    // First slice drives both joints at once.
    rig.step();
    let bus = rig.sup.bus();
    assert_eq!(bus.drive(0).unwrap().setpoint(), Setpoint::Position(0.2));
    assert_eq!(bus.drive(1).unwrap().setpoint(), Setpoint::Position(-0.2));

    assert!(rig.run_until(5000, |s| !s.scheduler().is_executing()));
    let stats = stats.borrow();
    assert_eq!(stats.len(), 1);
    assert!(stats[0].success);
    assert_eq!(stats[0].executed_count, 5);
    assert!(stats[0].elapsed_ms >= 500);

    assert!(position(&rig, 0).abs() <= 1e-3);
    assert!(position(&rig, 1).abs() <= 1e-3);
    assert!(rig.sup.scheduler().commands().iter().all(|c| c.has_ended()));
    assert_eq!(rig.sup.state(), SystemState::Active);
}

#[test]
fn unreachable_target_times_out() {
    let mut rig = Rig::active();
    let stats = record_stats(&mut rig);

    // Beyond the hard stop.
    rig.sup.submit(ControlType::Position, 0, 1.5, false).unwrap();
    let now = rig.now();
    rig.sup.start_execution(now).unwrap();

    assert!(rig.run_until(6000, |s| !s.scheduler().is_executing()));
    assert!(!stats.borrow()[0].success);
    assert!(rig.sup.scheduler().commands()[0].timed_out());
}

#[test]
fn estop_aborts_batch_and_keeps_queue() {
    let mut rig = Rig::active();
    let stats = record_stats(&mut rig);

    rig.sup.submit(ControlType::Velocity, 0, 0.5, false).unwrap();
    rig.sup.submit(ControlType::Torque, 1, -0.01, false).unwrap();
    let now = rig.now();
    rig.sup.start_execution(now).unwrap();
    rig.run_for(100);

    rig.sup.set_estop(true);
    rig.step();
    let stats = stats.borrow();
    assert_eq!(stats.len(), 1);
    assert!(!stats[0].success);
    assert_eq!(stats[0].executed_count, 0);
    assert!(!rig.sup.scheduler().is_executing());
    assert_eq!(rig.sup.scheduler().len(), 2);
}

#[test]
fn finished_batch_needs_reset_to_rerun() {
    let mut rig = Rig::active();
    let stats = record_stats(&mut rig);
    rig.sup
        .add_command(Command::new(CommandKind::Dwell { duration_ms: 100 }, false))
        .unwrap();

    for _ in 0..2 {
        let now = rig.now();
        rig.sup.start_execution(now).unwrap();
        assert!(rig.run_until(500, |s| !s.scheduler().is_executing()));
    }
    rig.sup.reset().unwrap();
    let now = rig.now();
    rig.sup.start_execution(now).unwrap();
    assert!(rig.run_until(500, |s| !s.scheduler().is_executing()));

    let counts: Vec<_> = stats.borrow().iter().map(|s| s.executed_count).collect();
    assert_eq!(counts, vec![1, 0, 1]);
}

#[test]
fn calibration_finds_both_stops() {
    let mut rig = Rig::active();
    let reports: Rc<RefCell<Vec<CalibrationReport>>> = Rc::default();
    let sink = reports.clone();
    rig.sup
        .on_calibration_complete(move |r| sink.borrow_mut().push(r.clone()));

    let now = rig.now();
    rig.sup.calibrate(now).unwrap();
    assert_eq!(
        rig.sup.submit(ControlType::Position, 0, 0.0, false),
        Err(SchedulerError::Calibrating)
    );
    assert_eq!(
        rig.sup.start_execution(now),
        Err(SchedulerError::Calibrating)
    );

    assert!(rig.run_until(3000, |s| !s.scheduler().is_calibrating()));
    let reports = reports.borrow();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].success);
    assert_eq!(reports[0].zero_position(0), Some(1.0));
    assert_eq!(reports[0].zero_position(1), Some(-1.0));

    let monitor = rig.sup.monitor();
    assert_eq!(monitor.device(0).unwrap().zero_offset(), Some(1.0));
    assert_eq!(monitor.device(1).unwrap().zero_offset(), Some(-1.0));
    for drive in rig.sup.bus().drives() {
        assert_eq!(drive.setpoint(), Setpoint::Torque(0.0));
    }
}

#[test]
fn drive_fault_aborts_calibration() {
    let mut rig = Rig::active();
    let reports: Rc<RefCell<Vec<CalibrationReport>>> = Rc::default();
    let sink = reports.clone();
    rig.sup
        .on_calibration_complete(move |r| sink.borrow_mut().push(r.clone()));

    let now = rig.now();
    rig.sup.calibrate(now).unwrap();
    rig.step();
    let fault = DeviceError::DRV_FAULT.bits();
    rig.sup.bus_mut().inject_error(1, fault).unwrap();

    assert!(rig.run_until(200, |s| s.state() == SystemState::Error));
    assert!(!rig.sup.scheduler().is_calibrating());
    let reports = reports.borrow();
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].success);
    assert_eq!(rig.sup.monitor().device(0).unwrap().zero_offset(), None);
}
