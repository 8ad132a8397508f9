//! Discovery and closed-loop enable against the simulated drives.

use rig_common::device::{ControlMode, DeviceError};
use rig_common::state::SystemState;
use rig_supervisor::startup::StartupError;

use super::rig::Rig;

#[test]
fn startup_brings_every_drive_into_closed_loop() {
    let mut rig = Rig::new();
    rig.sup.startup(&rig.clock).unwrap();

    for id in [0, 1] {
        let dev = rig.sup.monitor().device(id).unwrap();
        assert!(dev.received_heartbeat());
        assert_eq!(dev.control_mode(), ControlMode::ClosedLoop);
    }
    // Arming is delayed and confirmed by the next heartbeat.
    assert!(rig.now() >= 100);
    assert!(rig.now() < 1000);
}

#[test]
fn latched_estop_is_cleared_during_startup() {
    let mut rig = Rig::new();
    rig.sup.bus_mut().drive_mut(1).unwrap().estop();
    rig.sup.startup(&rig.clock).unwrap();
    assert_eq!(rig.sup.bus().drive(1).unwrap().error_code(), 0);
    assert_eq!(rig.sup.bus().drive(1).unwrap().mode(), ControlMode::ClosedLoop);
}

#[test]
fn silent_drive_fails_discovery() {
    let mut rig = Rig::new();
    rig.sup.bus_mut().set_silent(1, true).unwrap();
    let err = rig.sup.startup(&rig.clock).unwrap_err();
    assert_eq!(
        err,
        StartupError::DeviceNotFound {
            device: 1,
            timeout_ms: 1000,
        }
    );
    // Bounded wait: gave up shortly after the timeout.
    assert!(rig.now() > 1000 && rig.now() <= 1020);
}

#[test]
fn faulted_drive_times_out_enabling() {
    let mut rig = Rig::new();
    let fault = DeviceError::DRV_FAULT.bits();
    rig.sup.bus_mut().inject_error(1, fault).unwrap();

    let err = rig.sup.startup(&rig.clock).unwrap_err();
    assert!(matches!(
        err,
        StartupError::ClosedLoopTimeout {
            device: 1,
            mode: ControlMode::Idle,
            ..
        }
    ));
    assert!(rig.sup.monitor().device(1).unwrap().clear_failed());

    // The cycle loop then holds the rig in Error.
    rig.run_for(50);
    assert_eq!(rig.sup.state(), SystemState::Error);
    assert!(matches!(
        rig.sup.last_fault_report().device_fault,
        Some((1, code)) if code & fault != 0
    ));
}
