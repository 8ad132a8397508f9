//! Status indicator colours.
//!
//! Two lamps: one for the safety state, one for bus link health.

use rig_common::state::SystemState;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LampColor {
    Off,
    Red,
    Green,
    Blue,
    Yellow,
    Cyan,
    Magenta,
}

impl LampColor {
    /// 8-bit RGB value for LED drivers.
    pub const fn rgb(self) -> (u8, u8, u8) {
        match self {
            Self::Off => (0, 0, 0),
            Self::Red => (255, 0, 0),
            Self::Green => (0, 255, 0),
            Self::Blue => (0, 0, 255),
            Self::Yellow => (255, 255, 0),
            Self::Cyan => (0, 255, 255),
            Self::Magenta => (255, 0, 255),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusLamps {
    pub state: LampColor,
    pub link: LampColor,
}

pub const fn state_lamp(state: SystemState) -> LampColor {
    match state {
        SystemState::Init => LampColor::Blue,
        SystemState::Ready => LampColor::Yellow,
        SystemState::Active => LampColor::Green,
        SystemState::Error => LampColor::Red,
    }
}

/// Link lamp from the per-device timeout mask (bit i = table index i).
pub const fn link_lamp(timeout_mask: u8, device_count: usize) -> LampColor {
    let all = if device_count >= 8 {
        u8::MAX
    } else {
        (1u8 << device_count) - 1
    };
    let lost = timeout_mask & all;
    match lost {
        0 => LampColor::Green,
        _ if lost == all => LampColor::Red,
        0b01 => LampColor::Cyan,
        0b10 => LampColor::Magenta,
        _ => LampColor::Yellow,
    }
}

pub const fn status_lamps(state: SystemState, timeout_mask: u8, device_count: usize) -> StatusLamps {
    StatusLamps {
        state: state_lamp(state),
        link: link_lamp(timeout_mask, device_count),
    }
}
