//! Fault injection on the simulated bus and the supervisor's response.

use rig_common::command::ControlType;
use rig_common::device::{ControlMode, DeviceError};
use rig_common::state::SystemState;
use rig_hal::sim::Setpoint;
use rig_supervisor::clock::Clock;
use rig_supervisor::command::{Command, CommandKind};
use rig_supervisor::supervisor::{CycleOutcome, Supervisor};

use super::rig::Rig;

#[test]
fn estop_disables_then_recovers_to_active() {
    let mut rig = Rig::active();

    rig.sup.set_estop(true);
    rig.step();
    assert_eq!(rig.sup.state(), SystemState::Error);
    for drive in rig.sup.bus().drives() {
        assert_eq!(drive.mode(), ControlMode::Idle);
        assert_eq!(drive.error_code(), DeviceError::ESTOP_REQUESTED.bits());
    }

    rig.run_for(300);
    assert_eq!(rig.sup.state(), SystemState::Error);

    rig.sup.set_estop(false);
    rig.step();
    assert_eq!(rig.sup.state(), SystemState::Init);
    assert!(rig.run_until(500, |s| s.state() == SystemState::Active));
    for drive in rig.sup.bus().drives() {
        assert_eq!(drive.error_code(), 0);
        assert_eq!(drive.mode(), ControlMode::ClosedLoop);
    }
}

#[test]
fn one_silent_drive_holds_error_without_reboot() {
    let mut rig = Rig::active();
    rig.sup.bus_mut().set_silent(1, true).unwrap();

    assert!(rig.run_until(1500, |s| s.state() == SystemState::Error));
    assert_eq!(rig.sup.last_fault_report().heartbeat_lost, 0b10);
    assert_eq!(rig.run_for(2000), CycleOutcome::Continue);
    assert_eq!(rig.sup.state(), SystemState::Error);
    assert_eq!(rig.sup.bus().reboot_count(), 0);

    rig.sup.bus_mut().set_silent(1, false).unwrap();
    assert!(rig.run_until(1000, |s| s.state() == SystemState::Active));
}

#[test]
fn total_silence_reboots_and_rebuilt_supervisor_starts() {
    let mut rig = Rig::active();
    rig.sup.bus_mut().set_silent(0, true).unwrap();
    rig.sup.bus_mut().set_silent(1, true).unwrap();

    assert_eq!(rig.run_for(2000), CycleOutcome::Reboot);
    assert_eq!(rig.sup.state(), SystemState::Error);
    assert!(rig.sup.last_fault_report().all_timed_out());
    assert_eq!(rig.sup.bus().reboot_count(), 1);

    let Rig { clock, sup } = rig;
    let config = sup.config().clone();
    let bus = sup.into_bus();
    let mut rig = Rig {
        sup: Supervisor::new(config, bus, clock.now_ms()),
        clock,
    };
    rig.sup.startup(&rig.clock).unwrap();
    assert!(rig.run_until(100, |s| s.state() == SystemState::Ready));
}

#[test]
fn staggered_silence_reboots_once_the_last_drive_is_lost() {
    let mut rig = Rig::active();
    rig.sup.bus_mut().set_silent(1, true).unwrap();
    assert_eq!(rig.run_for(300), CycleOutcome::Continue);
    rig.sup.bus_mut().set_silent(0, true).unwrap();

    // Drive 1 times out first: Error without a reboot.
    assert!(rig.run_until(1500, |s| s.state() == SystemState::Error));
    assert!(!rig.sup.last_fault_report().all_timed_out());
    assert_eq!(rig.sup.bus().reboot_count(), 0);

    assert_eq!(rig.run_for(5000), CycleOutcome::Reboot);
    assert_eq!(rig.sup.state(), SystemState::Error);
    assert!(rig.sup.last_fault_report().all_timed_out());
    assert_eq!(rig.sup.bus().reboot_count(), 1);
}

#[test]
fn unclearable_fault_is_sticky() {
    let mut rig = Rig::active();
    let fault = DeviceError::MOTOR_OVER_TEMP.bits();
    rig.sup.bus_mut().inject_error(0, fault).unwrap();

    assert!(rig.run_until(200, |s| s.state() == SystemState::Error));
    rig.run_for(1000);
    assert_eq!(rig.sup.state(), SystemState::Error);
    assert_eq!(rig.sup.bus().reboot_count(), 0);
    // Every drive was e-stopped on entry.
    assert_eq!(rig.sup.bus().drive(1).unwrap().mode(), ControlMode::Idle);
}

#[test]
fn deadman_release_pauses_batch() {
    let mut rig = Rig::active();
    rig.sup.submit(ControlType::Velocity, 0, 0.5, false).unwrap();
    let now = rig.now();
    rig.sup.start_execution(now).unwrap();
    rig.run_for(100);

    rig.sup.set_deadman(false);
    rig.step();
    assert_eq!(rig.sup.state(), SystemState::Ready);
    assert_eq!(
        rig.sup.bus().drive(0).unwrap().setpoint(),
        Setpoint::Torque(0.0)
    );
    rig.run_for(1000);
    assert!(rig.sup.scheduler().is_executing());

    rig.sup.set_deadman(true);
    assert!(rig.run_until(100, |s| !s.scheduler().is_executing()));
}

#[test]
fn resumed_batch_restores_setpoint() {
    let mut rig = Rig::active();
    let torque = Command::new(
        CommandKind::Torque {
            device: 1,
            target: 0.02,
            duration_ms: 3000,
        },
        false,
    );
    rig.sup.add_command(torque).unwrap();
    let now = rig.now();
    rig.sup.start_execution(now).unwrap();
    rig.run_for(100);
    assert_eq!(
        rig.sup.bus().drive(1).unwrap().setpoint(),
        Setpoint::Torque(0.02)
    );

    rig.sup.set_deadman(false);
    rig.step();
    assert_eq!(
        rig.sup.bus().drive(1).unwrap().setpoint(),
        Setpoint::Torque(0.0)
    );

    rig.sup.set_deadman(true);
    assert!(rig.run_until(100, |s| s.state() == SystemState::Active));
    assert!(rig.sup.scheduler().is_executing());
    assert_eq!(
        rig.sup.bus().drive(1).unwrap().setpoint(),
        Setpoint::Torque(0.02)
    );
}
