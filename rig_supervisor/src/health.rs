//! Device liveness tracking.
//!
//! [`DeviceHealthMonitor`] owns the device table. Bus frames update the
//! records through [`DeviceHealthMonitor::apply`]; [`DeviceHealthMonitor::tick`]
//! recomputes each device's heartbeat-timeout flag from the clock.

use heapless::Vec as HVec;
use rig_common::bus::{ActuatorBus, BusEvent};
use rig_common::consts::{MAX_DEVICES, Millis};
use rig_common::device::{Device, DeviceError, DeviceId};
use tracing::{debug, trace, warn};

use crate::clock::Clock;

/// Interval between bus polls while waiting for a device.
pub const DISCOVERY_POLL_MS: Millis = 10;

#[derive(Debug, Clone)]
pub struct DeviceHealthMonitor {
    devices: HVec<Device, MAX_DEVICES>,
    timeout_ms: Millis,
}

impl DeviceHealthMonitor {
    /// Build the table. Entries beyond `MAX_DEVICES` are dropped with a
    /// warning; configuration validation rejects such files first.
    pub fn new<'a>(
        timeout_ms: Millis,
        created_at: Millis,
        devices: impl IntoIterator<Item = (DeviceId, &'a str)>,
    ) -> Self {
        let mut table = HVec::new();
        for (id, name) in devices {
            if table.push(Device::new(id, name, created_at)).is_err() {
                warn!(device = id, "device table full, entry ignored");
            }
        }
        Self {
            devices: table,
            timeout_ms,
        }
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id() == id)
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id() == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.iter().map(Device::id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn timeout_ms(&self) -> Millis {
        self.timeout_ms
    }

    /// Recompute every timeout flag.
    pub fn tick(&mut self, now: Millis) {
        for dev in self.devices.iter_mut() {
            let was = dev.heartbeat_timeout();
            let lost = dev.refresh_timeout(now, self.timeout_ms);
            if lost && !was {
                warn!(
                    device = dev.id(),
                    name = dev.name(),
                    silent_ms = now.saturating_sub(dev.last_heartbeat_time()),
                    "heartbeat lost"
                );
            } else if was && !lost {
                debug!(device = dev.id(), "heartbeat restored");
            }
        }
    }

    /// Record a bare heartbeat. Returns false for an unknown device.
    pub fn on_heartbeat(&mut self, id: DeviceId, now: Millis) -> bool {
        match self.device_mut(id) {
            Some(dev) => {
                let (code, mode) = (dev.error_code(), dev.control_mode());
                dev.apply_heartbeat(now, code, mode);
                true
            }
            None => false,
        }
    }

    /// Route one bus frame into its device record.
    pub fn apply(&mut self, event: &BusEvent, now: Millis) {
        let Some(dev) = self.device_mut(event.device()) else {
            trace!(device = event.device(), "frame from unknown device ignored");
            return;
        };
        match *event {
            BusEvent::Heartbeat {
                error_code,
                control_mode,
                ..
            } => {
                if let Some(previous) = dev.apply_heartbeat(now, error_code, control_mode) {
                    if error_code == 0 {
                        debug!(device = dev.id(), previous, "device errors cleared");
                    } else {
                        warn!(
                            device = dev.id(),
                            name = dev.name(),
                            code = error_code,
                            flags = ?DeviceError::from_bits_retain(error_code),
                            "device error changed"
                        );
                    }
                }
            }
            BusEvent::Feedback {
                position, velocity, ..
            } => dev.apply_feedback(position, velocity),
            BusEvent::Temperature {
                motor_temperature, ..
            } => dev.apply_temperature(motor_temperature),
        }
    }

    /// Drain the bus into the table and refresh timeouts.
    pub fn pump(&mut self, bus: &mut dyn ActuatorBus, now: Millis) {
        bus.poll_bus(now, &mut |event| self.apply(&event, now));
        self.tick(now);
    }

    /// True if at least one device is tracked and every one has timed out.
    pub fn all_timed_out(&self) -> bool {
        !self.devices.is_empty() && self.devices.iter().all(Device::heartbeat_timeout)
    }

    pub fn any_timed_out(&self) -> bool {
        self.devices.iter().any(Device::heartbeat_timeout)
    }

    /// Timeout flags packed by table index (bit 0 = first device).
    pub fn timeout_mask(&self) -> u8 {
        self.devices
            .iter()
            .enumerate()
            .filter(|(_, d)| d.heartbeat_timeout())
            .fold(0u8, |mask, (i, _)| mask | (1 << i))
    }

    pub fn set_clear_failed(&mut self, id: DeviceId, failed: bool) {
        if let Some(dev) = self.device_mut(id) {
            dev.set_clear_failed(failed);
        }
    }

    pub fn set_zero_offset(&mut self, id: DeviceId, offset: f32) {
        if let Some(dev) = self.device_mut(id) {
            dev.set_zero_offset(offset);
        }
    }

    /// Poll until `id` has sent its first heartbeat or `timeout_ms` elapses.
    ///
    /// `pump` moves bus traffic into the monitor; it is called at least
    /// once. Returns whether the device was seen.
    pub fn wait_for_device(
        &mut self,
        id: DeviceId,
        timeout_ms: Millis,
        clock: &dyn Clock,
        pump: &mut dyn FnMut(&mut Self, Millis),
    ) -> bool {
        let start = clock.now_ms();
        loop {
            let now = clock.now_ms();
            pump(self, now);
            if self.device(id).is_some_and(Device::received_heartbeat) {
                debug!(device = id, waited_ms = now - start, "device discovered");
                return true;
            }
            if now.saturating_sub(start) > timeout_ms {
                return false;
            }
            clock.delay_ms(DISCOVERY_POLL_MS);
        }
    }
}
