//! Rig-wide constants.
//!
//! Capacities size every fixed collection on the cycle path. Timing
//! values are the defaults used when the configuration omits a field.

/// Milliseconds on the monotonic rig clock.
pub type Millis = u64;

/// Maximum number of actuator controllers on one bus.
pub const MAX_DEVICES: usize = 8;

/// Maximum number of queued commands.
pub const MAX_COMMANDS: usize = 64;

/// Maximum number of actions attached to one state transition.
pub const MAX_TRANSITION_ACTIONS: usize = 4;

/// A device whose last heartbeat is older than this is considered lost.
pub const HEARTBEAT_TIMEOUT_MS: Millis = 1000;

/// Default supervisor cycle period.
pub const CYCLE_TIME_MS: Millis = 10;

/// Default bound on waiting for a device's first heartbeat.
pub const DISCOVERY_TIMEOUT_MS: Millis = 1000;

/// Default bound on waiting for a device to report closed-loop control.
pub const ENABLE_TIMEOUT_MS: Millis = 1000;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/supervisor.toml";
