//! Worker processes
//!
//! Each pipeline role runs in its own OS process: the orchestrator re-executes
//! the current binary with [`WORKER_CONFIG_ENV`] holding the role's frozen
//! configuration as JSON. Roles:
//!
//! - [`capture`] - Capture-Transport, reads the event source and transmits
//!   descriptions and events to the Model
//! - [`model`] - validates events against their descriptions, persists the
//!   dataset and forwards to Presentation
//! - [`presentation`] - renders a live view of the incoming events
//!
//! Workers report how they ended through their exit status, see
//! [`WorkerExit`].

pub mod capture;
pub mod dataset;
pub mod model;
pub mod plot;
pub mod presentation;
pub mod source;
pub mod supervisor;

pub use supervisor::{supervise, CloseGuard, LoopExit, StartupGate, Worker, WorkerOutcome};

use std::process::ExitStatus;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::channel::ChannelAddressSet;
use crate::config::{CaptureSettings, Dataset, LogLevel, PresentationSettings};
use crate::error::{PipelineError, Result};
use crate::readiness::{ReadinessBarrier, ReadinessSignal};
use crate::shutdown::{install_signal_handler, ShutdownFlag};

use capture::CaptureWorker;
use model::ModelWorker;
use presentation::PresentationWorker;

/// Environment variable carrying a worker's configuration
pub const WORKER_CONFIG_ENV: &str = "RTT_PLOT_WORKER";

/// Main loop reached its own end
pub const EXIT_COMPLETED: i32 = 0;
/// Runtime error after a successful start
pub const EXIT_FAULTED: i32 = 1;
/// Construction failed (e.g. an address was already bound)
pub const EXIT_STARTUP_FAILED: i32 = 3;
/// Stopped by a termination signal (128 + SIGINT)
pub const EXIT_INTERRUPTED: i32 = 130;

/// Pipeline role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    CaptureTransport,
    Model,
    Presentation,
}

impl Role {
    /// Consumers first, so their readiness can be signalled before the
    /// producer starts waiting on it
    pub const LAUNCH_ORDER: [Role; 3] = [Role::Presentation, Role::Model, Role::CaptureTransport];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::CaptureTransport => "capture-transport",
            Role::Model => "model",
            Role::Presentation => "presentation",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role-specific frozen configuration
///
/// Remote sets are the same `Arc` as the consumer's inbound set; both sides
/// of a hop serialize the one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "kebab-case")]
pub enum WorkerSpec {
    CaptureTransport {
        own: Arc<ChannelAddressSet>,
        remote: Arc<ChannelAddressSet>,
        barrier: ReadinessBarrier,
        capture: CaptureSettings,
    },
    Model {
        inbound: Arc<ChannelAddressSet>,
        own: Arc<ChannelAddressSet>,
        remote: Arc<ChannelAddressSet>,
        dataset: Dataset,
        announces: ReadinessSignal,
    },
    Presentation {
        inbound: Arc<ChannelAddressSet>,
        announces: ReadinessSignal,
        presentation: PresentationSettings,
    },
}

impl WorkerSpec {
    pub fn role(&self) -> Role {
        match self {
            WorkerSpec::CaptureTransport { .. } => Role::CaptureTransport,
            WorkerSpec::Model { .. } => Role::Model,
            WorkerSpec::Presentation { .. } => Role::Presentation,
        }
    }
}

/// Everything a worker process needs, frozen at pipeline creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub log_level: LogLevel,
    pub spec: WorkerSpec,
}

impl WorkerConfig {
    pub fn role(&self) -> Role {
        self.spec.role()
    }

    pub fn to_env_value(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_env_value(value: &str) -> Result<Self> {
        serde_json::from_str(value).map_err(|e| {
            PipelineError::Config(format!("invalid {} value: {}", WORKER_CONFIG_ENV, e))
        })
    }

    /// The configuration handed to this process, if it is a worker
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(WORKER_CONFIG_ENV) {
            Ok(value) => Self::from_env_value(&value).map(Some),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(PipelineError::Config(format!(
                "invalid {} value: {}",
                WORKER_CONFIG_ENV, e
            ))),
        }
    }
}

/// How a worker process ended, as seen by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Completed,
    Interrupted,
    StartupFailed,
    Faulted(i32),
    /// Terminated by a signal it did not handle, or killed by the orchestrator
    Killed,
}

impl WorkerExit {
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(EXIT_COMPLETED) => WorkerExit::Completed,
            Some(EXIT_INTERRUPTED) => WorkerExit::Interrupted,
            Some(EXIT_STARTUP_FAILED) => WorkerExit::StartupFailed,
            Some(code) => WorkerExit::Faulted(code),
            None => WorkerExit::Killed,
        }
    }

    pub fn from_status(status: ExitStatus) -> Self {
        Self::from_code(status.code())
    }

    /// Completed or interrupted
    pub fn is_clean(&self) -> bool {
        matches!(self, WorkerExit::Completed | WorkerExit::Interrupted)
    }
}

impl std::fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerExit::Completed => write!(f, "completed"),
            WorkerExit::Interrupted => write!(f, "interrupted"),
            WorkerExit::StartupFailed => write!(f, "startup failed"),
            WorkerExit::Faulted(code) => write!(f, "faulted (exit code {})", code),
            WorkerExit::Killed => write!(f, "killed"),
        }
    }
}

/// Worker process entry point
pub fn run_worker(config: WorkerConfig) -> WorkerOutcome {
    let role = config.role();
    let span = tracing::info_span!("worker", role = %role);
    let _enter = span.enter();

    let shutdown = ShutdownFlag::new();
    if let Err(e) = install_signal_handler(shutdown.clone()) {
        tracing::error!("{} worker cannot handle signals: {}", role, e);
        return WorkerOutcome::StartupFailed(e);
    }
    tracing::debug!("{} worker started (pid {})", role, std::process::id());

    match config.spec {
        WorkerSpec::CaptureTransport {
            own,
            remote,
            barrier,
            capture,
        } => supervise(
            role,
            || CaptureWorker::new(&own, &remote, &capture),
            StartupGate::Await(&barrier),
            &shutdown,
        ),
        WorkerSpec::Model {
            inbound,
            own,
            remote,
            dataset,
            announces,
        } => supervise(
            role,
            || ModelWorker::new(&inbound, &own, &remote, &dataset),
            StartupGate::Announce(&announces),
            &shutdown,
        ),
        WorkerSpec::Presentation {
            inbound,
            announces,
            presentation,
        } => supervise(
            role,
            || PresentationWorker::new(&inbound, &presentation),
            StartupGate::Announce(&announces),
            &shutdown,
        ),
    }
}
