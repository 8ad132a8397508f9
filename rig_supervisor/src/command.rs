//! Command execution: lifecycle, batch slicing, calibration and the
//! scheduler that drives them.

pub mod calibration;
pub mod lifecycle;
pub mod scheduler;
pub mod slice;

pub use calibration::{CalibrationRoutine, JointCalibrator, JointPhase};
pub use lifecycle::{Command, CommandError, CommandKind};
pub use scheduler::{CommandScheduler, SchedulerError, SchedulerTick};
pub use slice::CommandSlice;
