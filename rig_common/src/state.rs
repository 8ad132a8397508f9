//! Global safety state of the rig.

use serde::{Deserialize, Serialize};

/// Supervisor safety state. Exactly one is current at any time.
///
/// `Active` is the only state in which commands reach the actuators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SystemState {
    /// Powered, waiting for every device to report healthy.
    Init = 0,
    /// Healthy and enabled, deadman released.
    Ready = 1,
    /// Deadman held, commands execute.
    Active = 2,
    /// A fault is present; drives are disabled.
    Error = 3,
}

impl SystemState {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Init),
            1 => Some(Self::Ready),
            2 => Some(Self::Active),
            3 => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether commands may drive actuators in this state.
    #[inline]
    pub const fn allows_motion(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl Default for SystemState {
    fn default() -> Self {
        Self::Init
    }
}

impl core::fmt::Display for SystemState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::Ready => "READY",
            Self::Active => "ACTIVE",
            Self::Error => "ERROR",
        };
        f.write_str(name)
    }
}
