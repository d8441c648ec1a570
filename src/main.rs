//! rtt-plot - Main Entry Point
//!
//! The same binary runs the orchestrator and, when re-executed with
//! `RTT_PLOT_WORKER` set, one of the three worker roles.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use rtt_plot::{
    cli::Args,
    logging,
    orchestrator::{Orchestrator, ProcessLauncher},
    shutdown::{install_signal_handler, ShutdownFlag},
    worker::{self, WorkerConfig, EXIT_STARTUP_FAILED},
    PipelineError, PipelineReport, RuntimeSettings,
};

// Exit codes
const EXIT_SUCCESS: u8 = 0;
const EXIT_ERROR: u8 = 1;
const EXIT_USAGE: u8 = 2;

fn main() -> ExitCode {
    match WorkerConfig::from_env() {
        Ok(Some(config)) => run_worker(config),
        Ok(None) => run_orchestrator(),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(EXIT_STARTUP_FAILED as u8)
        }
    }
}

fn run_worker(config: WorkerConfig) -> ExitCode {
    let _guard = logging::init(config.log_level);
    let outcome = worker::run_worker(config);
    ExitCode::from(outcome.exit_code() as u8)
}

fn run_orchestrator() -> ExitCode {
    let args = Args::parse();

    // Configuration is resolved before anything is logged or launched.
    let config = match RuntimeSettings::from_env().and_then(|settings| args.into_config(settings)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let _guard = logging::init(config.log_level);
    tracing::info!(
        "Starting rtt-plot for dataset '{}' (log level {})",
        config.dataset,
        config.log_level
    );

    match run(config) {
        Ok(report) if report.is_clean() => {
            tracing::info!("Pipeline finished cleanly");
            ExitCode::from(EXIT_SUCCESS)
        }
        Ok(report) => {
            for (role, exit) in &report.exits {
                if !exit.is_clean() {
                    tracing::error!("{} worker: {}", role, exit);
                }
            }
            ExitCode::from(EXIT_ERROR)
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            if matches!(e.downcast_ref::<PipelineError>(), Some(PipelineError::Config(_))) {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::from(EXIT_ERROR)
            }
        }
    }
}

fn run(config: rtt_plot::PipelineConfig) -> anyhow::Result<PipelineReport> {
    let shutdown = ShutdownFlag::new();
    install_signal_handler(shutdown.clone()).context("Failed to install signal handler")?;

    let launcher = ProcessLauncher::current()?;
    let report = Orchestrator::new(config, shutdown).run(&launcher)?;
    Ok(report)
}
