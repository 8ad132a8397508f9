//! # Rig Supervisor
//!
//! Runs the safety supervisor against the simulated actuator bus.
//!
//! A controller reboot requested by the safety layer is handled as a
//! power cycle: the supervisor is rebuilt from configuration and startup
//! runs again, up to `--max-reboots` times.

use clap::Parser;
use rig_common::command::{CalibrationReport, ControlType, ExecutionStats};
use rig_common::config::LogLevel;
use rig_common::consts::DEFAULT_CONFIG_PATH;
use rig_hal::sim::SimulatedBus;
use rig_supervisor::clock::{Clock, MonotonicClock};
use rig_supervisor::config::{SupervisorConfig, load_config};
use rig_supervisor::cycle::{CycleRunner, RunOutcome};
use rig_supervisor::error::SupervisorError;
use rig_supervisor::supervisor::Supervisor;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Robotic finger rig supervisor
#[derive(Parser, Debug)]
#[command(name = "rig_supervisor")]
#[command(version)]
#[command(about = "Safety supervisor and command scheduler for the finger test rig")]
struct Args {
    /// Path to the supervisor configuration TOML.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Number of cycles to run (0 = until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    cycles: u64,

    /// Hold the deadman switch after startup.
    #[arg(long)]
    auto_enable: bool,

    /// Calibrate, then run a short command batch (implies --auto-enable).
    #[arg(long)]
    demo: bool,

    /// Give up after this many controller reboots.
    #[arg(long, default_value_t = 3)]
    max_reboots: u32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            setup_tracing(&args, LogLevel::Info);
            error!("FATAL: {e}");
            process::exit(1);
        }
    };
    setup_tracing(&args, config.shared.log_level);

    info!(
        "Rig supervisor v{} starting ({})",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name
    );

    if let Err(e) = run(&args, &config) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Rig supervisor shutdown complete");
}

fn run(args: &Args, config: &SupervisorConfig) -> Result<(), SupervisorError> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let clock = MonotonicClock::new();
    let mut bus = SimulatedBus::new(
        config.simulation.clone(),
        config.devices.iter().map(|d| d.id),
    );
    let limit = (args.cycles > 0).then_some(args.cycles);
    let mut reboots = 0u32;

    loop {
        let mut supervisor = Supervisor::new(config.clone(), bus, clock.now_ms());
        supervisor.on_execution_complete(log_execution);
        supervisor.on_calibration_complete(log_calibration);

        if let Err(e) = supervisor.startup(&clock) {
            // The safety loop keeps the rig disabled until devices recover.
            error!("startup incomplete: {e}");
        }
        if args.auto_enable || args.demo {
            supervisor.set_deadman(true);
        }

        let mut runner = CycleRunner::new(supervisor, &clock, running.clone());
        let outcome = if args.demo && reboots == 0 {
            run_demo(&mut runner, limit)?
        } else {
            runner.run(limit)
        };

        let stats = runner.stats();
        info!(
            cycles = stats.cycle_count,
            avg_us = stats.avg_cycle_us(),
            max_us = stats.max_cycle_us,
            overruns = stats.overruns,
            "cycle loop exited"
        );

        match outcome {
            RunOutcome::Reboot => {
                reboots += 1;
                if reboots > args.max_reboots {
                    return Err(SupervisorError::RebootLimit { count: reboots });
                }
                warn!(reboots, "rebuilding supervisor after controller reboot");
                bus = runner.into_supervisor().into_bus();
            }
            RunOutcome::Stopped | RunOutcome::Finished => return Ok(()),
        }
    }
}

/// Calibrate, run a two-joint batch, then keep cycling.
fn run_demo(
    runner: &mut CycleRunner<'_, SimulatedBus>,
    limit: Option<u64>,
) -> Result<RunOutcome, SupervisorError> {
    let outcome = runner.run_while(|s| !s.state().allows_motion());
    if outcome != RunOutcome::Finished {
        return Ok(outcome);
    }

    let now = runner.now_ms();
    runner.supervisor_mut().calibrate(now)?;
    let outcome = runner.run_while(|s| s.scheduler().is_calibrating());
    if outcome != RunOutcome::Finished {
        return Ok(outcome);
    }

    let sup = runner.supervisor_mut();
    sup.submit(ControlType::Position, 0, 0.2, true)?;
    sup.submit(ControlType::Position, 1, -0.2, false)?;
    sup.submit(ControlType::Torque, 0, 0.01, false)?;
    sup.submit(ControlType::Velocity, 1, 0.5, false)?;
    sup.submit(ControlType::Position, 0, 0.0, true)?;
    sup.submit(ControlType::Position, 1, 0.0, false)?;
    let now = runner.now_ms();
    runner.supervisor_mut().start_execution(now)?;

    let outcome = runner.run_while(|s| s.scheduler().is_executing());
    if outcome != RunOutcome::Finished {
        return Ok(outcome);
    }
    Ok(runner.run(limit))
}

fn log_execution(stats: &ExecutionStats) {
    info!(
        success = stats.success,
        executed = stats.executed_count,
        elapsed_ms = stats.elapsed_ms,
        "batch finished"
    );
}

fn log_calibration(report: &CalibrationReport) {
    info!(
        success = report.success,
        elapsed_ms = report.elapsed_ms,
        joints = ?report.joints,
        "calibration finished"
    );
}

/// Setup tracing subscriber based on CLI arguments and configured level.
fn setup_tracing(args: &Args, level: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        level.as_directive()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
