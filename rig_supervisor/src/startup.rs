//! Bounded startup waits.
//!
//! Both waits poll the bus through the health monitor against an injected
//! [`Clock`], so they terminate on their own timeout and are testable
//! without real time passing.
//!
//! 1. Discovery: every configured device must send a heartbeat within
//!    `discovery_timeout_ms`.
//! 2. Enable: safe errors are cleared and closed-loop control requested
//!    until the device reports it, bounded by `enable_timeout_ms`.

use rig_common::bus::ActuatorBus;
use rig_common::consts::{MAX_DEVICES, Millis};
use rig_common::device::{ControlMode, DeviceId};
use thiserror::Error;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::LoopConfig;
use crate::health::DeviceHealthMonitor;
use crate::safety::actions::clear_safe_errors;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartupError {
    #[error("device {device} sent no heartbeat within {timeout_ms} ms")]
    DeviceNotFound { device: DeviceId, timeout_ms: Millis },

    #[error("device {device} not in closed loop after {timeout_ms} ms (reports {mode:?})")]
    ClosedLoopTimeout {
        device: DeviceId,
        timeout_ms: Millis,
        mode: ControlMode,
    },
}

fn device_ids(monitor: &DeviceHealthMonitor) -> heapless::Vec<DeviceId, MAX_DEVICES> {
    monitor.ids().collect()
}

/// Wait for the first heartbeat of every tracked device.
pub fn discover_devices(
    bus: &mut dyn ActuatorBus,
    monitor: &mut DeviceHealthMonitor,
    clock: &dyn Clock,
    timeout_ms: Millis,
) -> Result<(), StartupError> {
    for id in device_ids(monitor) {
        let found = monitor.wait_for_device(id, timeout_ms, clock, &mut |m, now| {
            m.pump(&mut *bus, now)
        });
        if !found {
            warn!(device = id, timeout_ms, bus = bus.name(), "device not found");
            return Err(StartupError::DeviceNotFound {
                device: id,
                timeout_ms,
            });
        }
    }
    info!(devices = monitor.len(), "all devices discovered");
    Ok(())
}

/// Bring every tracked device into closed-loop control.
///
/// Per device: request closed loop, then poll `enable_retry_polls` times
/// every `enable_poll_interval_ms`; repeat until the device reports
/// `ClosedLoop` or `enable_timeout_ms` has elapsed.
pub fn enable_closed_loop(
    bus: &mut dyn ActuatorBus,
    monitor: &mut DeviceHealthMonitor,
    clock: &dyn Clock,
    config: &LoopConfig,
) -> Result<(), StartupError> {
    for id in device_ids(monitor) {
        let start = clock.now_ms();
        clear_safe_errors(id, bus, monitor, config.safe_error_mask);
        loop {
            let mode = monitor
                .device(id)
                .map_or(ControlMode::Undefined, |d| d.control_mode());
            if mode == ControlMode::ClosedLoop {
                info!(device = id, waited_ms = clock.now_ms() - start, "closed loop");
                break;
            }
            if clock.now_ms().saturating_sub(start) > config.enable_timeout_ms {
                warn!(device = id, ?mode, "closed loop not reached");
                return Err(StartupError::ClosedLoopTimeout {
                    device: id,
                    timeout_ms: config.enable_timeout_ms,
                    mode,
                });
            }
            if let Err(e) = bus.send_state(id, ControlMode::ClosedLoop) {
                warn!(device = id, "closed-loop request failed: {e}");
            }
            for _ in 0..config.enable_retry_polls {
                clock.delay_ms(config.enable_poll_interval_ms);
                monitor.pump(bus, clock.now_ms());
                if monitor
                    .device(id)
                    .is_some_and(|d| d.control_mode() == ControlMode::ClosedLoop)
                {
                    break;
                }
            }
        }
    }
    Ok(())
}
