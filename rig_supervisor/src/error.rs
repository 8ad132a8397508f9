//! Top-level error for the supervisor binary.

use rig_common::config::ConfigError;
use thiserror::Error;

use crate::command::SchedulerError;
use crate::startup::StartupError;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("startup failed: {0}")]
    Startup(#[from] StartupError),

    #[error("scheduler: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("controller rebooted {count} times, giving up")]
    RebootLimit { count: u32 },

    #[error("signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}
