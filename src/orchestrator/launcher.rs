//! Spawning worker processes
//!
//! The join loop only talks to [`Launcher`] and [`WorkerProcess`], so it can
//! be driven by fakes in tests. [`ProcessLauncher`] is the real thing: it
//! re-executes the current binary with the worker configuration in the
//! environment.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use crate::error::{PipelineError, Result, ResultExt};
use crate::worker::{Role, WorkerConfig, WorkerExit, WORKER_CONFIG_ENV};

/// Handle to one running worker
#[cfg_attr(test, mockall::automock)]
pub trait WorkerProcess: Send {
    fn pid(&self) -> u32;

    /// Exit status if the worker has terminated, without blocking
    fn try_wait(&mut self) -> Result<Option<WorkerExit>>;

    /// Forcefully terminate and reap the worker
    fn kill(&mut self) -> Result<()>;
}

/// Starts worker processes
pub trait Launcher {
    fn launch(&self, config: &WorkerConfig) -> Result<Box<dyn WorkerProcess>>;
}

/// Launches workers as child processes of this binary
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    executable: PathBuf,
}

impl ProcessLauncher {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Launch workers from the running executable
    pub fn current() -> Result<Self> {
        let executable = std::env::current_exe().context("Failed to locate own executable")?;
        Ok(Self::new(executable))
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, config: &WorkerConfig) -> Result<Box<dyn WorkerProcess>> {
        let role = config.role();
        let child = Command::new(&self.executable)
            .env(WORKER_CONFIG_ENV, config.to_env_value()?)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| PipelineError::process(role, format!("spawn failed: {}", e)))?;

        Ok(Box::new(ChildProcess {
            role,
            child,
            reaped: false,
        }))
    }
}

/// A spawned worker; killed on drop if still running
struct ChildProcess {
    role: Role,
    child: Child,
    reaped: bool,
}

impl WorkerProcess for ChildProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> Result<Option<WorkerExit>> {
        let status = self
            .child
            .try_wait()
            .map_err(|e| PipelineError::process(self.role, e))?;
        Ok(status.map(|status| {
            self.reaped = true;
            WorkerExit::from_status(status)
        }))
    }

    fn kill(&mut self) -> Result<()> {
        if self.reaped {
            return Ok(());
        }
        if let Err(e) = self.child.kill() {
            // InvalidInput: already exited, nothing to kill
            if e.kind() != std::io::ErrorKind::InvalidInput {
                return Err(PipelineError::process(self.role, e));
            }
        }
        let _ = self.child.wait();
        self.reaped = true;
        Ok(())
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.kill();
        }
    }
}
