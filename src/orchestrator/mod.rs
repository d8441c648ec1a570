//! Orchestrator: builds the pipeline, launches the workers and joins them
//!
//! The orchestrator resolves everything up front (addresses, readiness
//! signals, per-worker configuration), launches the consumers before the
//! producer, then polls its children until all three have terminated:
//!
//! ```text
//! Idle ─► Configuring ─► Launching ─► Running ─► Draining ─► Terminated
//!                                        │           ▲
//!                                        └───────────┘
//!                           interrupt, or first worker exit
//! ```
//!
//! After an interrupt the workers get a grace period to close on their own;
//! whatever is still running afterwards is killed.

pub mod launcher;
pub mod state;

pub use launcher::{Launcher, ProcessLauncher, WorkerProcess};
pub use state::{OrchestratorState, StateMachine};

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::channel::{AddressPlan, AddressingConfig};
use crate::config::PipelineConfig;
use crate::error::{Result, ResultExt};
use crate::readiness::{ReadinessBarrier, ReadinessSignal, MODEL_READY, PLOT_READY};
use crate::shutdown::ShutdownFlag;
use crate::worker::{Role, WorkerConfig, WorkerExit, WorkerSpec};

/// Interval between child status polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The three worker configurations and everything they share
pub struct Pipeline {
    run_dir: TempDir,
    plan: AddressPlan,
    plot_ready: ReadinessSignal,
    model_ready: ReadinessSignal,
    workers: Vec<WorkerConfig>,
}

impl Pipeline {
    /// Compute the address plan, create both signals (unset) and freeze the
    /// configuration of every worker
    pub fn create(config: &PipelineConfig) -> Result<Self> {
        let addressing = AddressingConfig::from_settings(&config.settings.addressing)?;
        let plan = AddressPlan::compute(&addressing);

        let run_dir = tempfile::Builder::new()
            .prefix("rtt-plot-")
            .tempdir()
            .context("Failed to create run directory")?;
        let plot_ready = ReadinessSignal::new(run_dir.path(), PLOT_READY);
        let model_ready = ReadinessSignal::new(run_dir.path(), MODEL_READY);

        let spec_for = |role: Role| match role {
            Role::Presentation => WorkerSpec::Presentation {
                inbound: Arc::clone(&plan.plot_in),
                announces: plot_ready.clone(),
                presentation: config.settings.presentation.clone(),
            },
            Role::Model => WorkerSpec::Model {
                inbound: Arc::clone(&plan.model_in),
                own: Arc::clone(&plan.model_out),
                remote: Arc::clone(&plan.plot_in),
                dataset: config.dataset.clone(),
                announces: model_ready.clone(),
            },
            Role::CaptureTransport => WorkerSpec::CaptureTransport {
                own: Arc::clone(&plan.capture_out),
                remote: Arc::clone(&plan.model_in),
                barrier: ReadinessBarrier::new(vec![plot_ready.clone(), model_ready.clone()]),
                capture: config.settings.capture.clone(),
            },
        };
        let workers = Role::LAUNCH_ORDER
            .into_iter()
            .map(|role| WorkerConfig {
                log_level: config.log_level,
                spec: spec_for(role),
            })
            .collect();

        Ok(Self {
            run_dir,
            plan,
            plot_ready,
            model_ready,
            workers,
        })
    }

    pub fn plan(&self) -> &AddressPlan {
        &self.plan
    }

    pub fn run_dir(&self) -> &Path {
        self.run_dir.path()
    }

    pub fn plot_ready(&self) -> &ReadinessSignal {
        &self.plot_ready
    }

    pub fn model_ready(&self) -> &ReadinessSignal {
        &self.model_ready
    }

    /// Worker configurations in launch order
    pub fn workers(&self) -> &[WorkerConfig] {
        &self.workers
    }

    pub fn worker(&self, role: Role) -> Option<&WorkerConfig> {
        self.workers.iter().find(|w| w.role() == role)
    }
}

/// How each worker ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub exits: BTreeMap<Role, WorkerExit>,
    /// An interrupt arrived before all workers had exited
    pub interrupted: bool,
}

impl PipelineReport {
    /// Every worker completed or was interrupted
    pub fn is_clean(&self) -> bool {
        self.exits.values().all(WorkerExit::is_clean)
    }
}

struct RunningWorker {
    role: Role,
    process: Box<dyn WorkerProcess>,
    exit: Option<WorkerExit>,
    killed: bool,
}

/// Owns one pipeline run
pub struct Orchestrator {
    config: PipelineConfig,
    shutdown: ShutdownFlag,
    machine: StateMachine,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, shutdown: ShutdownFlag) -> Self {
        Self {
            config,
            shutdown,
            machine: StateMachine::new(),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.machine.state()
    }

    pub fn history(&self) -> &[OrchestratorState] {
        self.machine.history()
    }

    /// Run the pipeline to completion
    pub fn run(&mut self, launcher: &dyn Launcher) -> Result<PipelineReport> {
        self.machine.advance(OrchestratorState::Configuring)?;
        let pipeline = Pipeline::create(&self.config)?;
        pipeline.plan().log_summary();
        tracing::debug!("Run directory {}", pipeline.run_dir().display());

        self.machine.advance(OrchestratorState::Launching)?;
        let mut workers = Vec::with_capacity(pipeline.workers().len());
        for config in pipeline.workers() {
            let role = config.role();
            match launcher.launch(config) {
                Ok(process) => {
                    tracing::info!("Launched {} worker (pid {})", role, process.pid());
                    workers.push(RunningWorker {
                        role,
                        process,
                        exit: None,
                        killed: false,
                    });
                }
                Err(e) => {
                    for worker in workers.iter_mut() {
                        if let Err(kill_err) = worker.process.kill() {
                            tracing::warn!("Failed to kill {} worker: {}", worker.role, kill_err);
                        }
                    }
                    return Err(e).with_context(|| format!("Failed to launch {} worker", role));
                }
            }
        }
        self.machine.advance(OrchestratorState::Running)?;

        let interrupted = self.join(&mut workers)?;
        self.machine.advance(OrchestratorState::Terminated)?;

        let exits = workers
            .iter()
            .map(|w| (w.role, w.exit.unwrap_or(WorkerExit::Killed)))
            .collect();
        Ok(PipelineReport { exits, interrupted })
    }

    /// Poll until every worker exited; returns whether an interrupt arrived
    fn join(&mut self, workers: &mut [RunningWorker]) -> Result<bool> {
        let grace = self.config.settings.shutdown_grace();
        let mut interrupted_at: Option<Instant> = None;

        loop {
            for worker in workers.iter_mut().filter(|w| w.exit.is_none()) {
                match worker.process.try_wait() {
                    Ok(Some(exit)) => {
                        log_exit(worker.role, exit);
                        worker.exit = Some(exit);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("Lost track of {} worker: {}", worker.role, e);
                        let _ = worker.process.kill();
                        worker.exit = Some(WorkerExit::Killed);
                    }
                }
            }

            if interrupted_at.is_none() && self.shutdown.is_triggered() {
                interrupted_at = Some(Instant::now());
                tracing::info!("Interrupted, waiting up to {:?} for workers to close", grace);
            }

            let any_exited = workers.iter().any(|w| w.exit.is_some());
            if self.machine.state() == OrchestratorState::Running
                && (any_exited || interrupted_at.is_some())
            {
                self.machine.advance(OrchestratorState::Draining)?;
            }

            if workers.iter().all(|w| w.exit.is_some()) {
                return Ok(interrupted_at.is_some());
            }

            if let Some(at) = interrupted_at {
                if at.elapsed() >= grace {
                    for worker in workers
                        .iter_mut()
                        .filter(|w| w.exit.is_none() && !w.killed)
                    {
                        tracing::warn!(
                            "{} worker still running after {:?}, killing it",
                            worker.role,
                            grace
                        );
                        if let Err(e) = worker.process.kill() {
                            tracing::error!("Failed to kill {} worker: {}", worker.role, e);
                        }
                        worker.killed = true;
                    }
                }
            }

            std::thread::sleep(self.poll_interval);
        }
    }
}

fn log_exit(role: Role, exit: WorkerExit) {
    match exit {
        WorkerExit::Completed | WorkerExit::Interrupted => {
            tracing::info!("{} worker exited: {}", role, exit)
        }
        WorkerExit::StartupFailed => {
            tracing::error!("{} worker failed to start", role);
            if role != Role::CaptureTransport {
                tracing::error!(
                    "{} stays blocked at the readiness barrier until interrupted",
                    Role::CaptureTransport
                );
            }
        }
        WorkerExit::Faulted(_) => tracing::error!("{} worker exited: {}", role, exit),
        WorkerExit::Killed => tracing::warn!("{} worker exited: {}", role, exit),
    }
}
