//! Readiness signals and the Capture-Transport barrier
//!
//! A [`ReadinessSignal`] is a one-shot flag shared between processes. It is
//! backed by a marker file inside the per-run directory the orchestrator
//! creates: setting creates the file, checking tests for it. Once set it
//! stays set for the life of the run.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::shutdown::ShutdownFlag;

/// Set by Presentation once its receivers are bound
pub const PLOT_READY: &str = "plot-ready";

/// Set by Model once its receivers are bound
pub const MODEL_READY: &str = "model-ready";

/// Interval between marker checks
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How often a blocked barrier reports what it is still waiting for
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    /// The waiting worker was asked to shut down first
    Interrupted,
}

/// One-shot, multi-waiter flag shared across processes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessSignal {
    name: String,
    marker: PathBuf,
}

impl ReadinessSignal {
    /// Signal `name` with its marker inside `run_dir`
    pub fn new(run_dir: &Path, name: impl Into<String>) -> Self {
        let name = name.into();
        let marker = run_dir.join(format!("{}.ready", name));
        Self { name, marker }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn marker(&self) -> &Path {
        &self.marker
    }

    /// Set the signal. Returns `false` if it was already set.
    pub fn set(&self) -> Result<bool> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.marker)
        {
            Ok(mut file) => {
                // The pid is informational; the file's existence is the signal.
                let _ = writeln!(file, "{}", std::process::id());
                tracing::debug!("Signal {} set", self.name);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(PipelineError::Readiness(format!(
                "cannot set {} at {}: {}",
                self.name,
                self.marker.display(),
                e
            ))),
        }
    }

    pub fn is_set(&self) -> bool {
        self.marker.exists()
    }

    /// Block until set, or until `shutdown` is triggered
    pub fn wait(&self, shutdown: &ShutdownFlag) -> WaitOutcome {
        loop {
            if self.is_set() {
                return WaitOutcome::Ready;
            }
            if shutdown.is_triggered() {
                return WaitOutcome::Interrupted;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Block until set or `timeout` elapses; `true` if set
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_set() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl std::fmt::Display for ReadinessSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// All signals a worker must observe before transmitting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessBarrier {
    signals: Vec<ReadinessSignal>,
}

impl ReadinessBarrier {
    pub fn new(signals: Vec<ReadinessSignal>) -> Self {
        Self { signals }
    }

    pub fn signals(&self) -> &[ReadinessSignal] {
        &self.signals
    }

    /// Names of the signals not yet set
    pub fn pending(&self) -> Vec<&str> {
        self.signals
            .iter()
            .filter(|s| !s.is_set())
            .map(|s| s.name())
            .collect()
    }

    /// Block, with no timeout, until every signal is set
    ///
    /// Only `shutdown` ends the wait early; a setter that died leaves the
    /// caller here until it is interrupted.
    pub fn wait(&self, shutdown: &ShutdownFlag) -> WaitOutcome {
        let mut last_report = Instant::now();
        loop {
            let pending = self.pending();
            if pending.is_empty() {
                return WaitOutcome::Ready;
            }
            if shutdown.is_triggered() {
                tracing::debug!("Barrier wait interrupted, still pending: {:?}", pending);
                return WaitOutcome::Interrupted;
            }
            if last_report.elapsed() >= REPORT_INTERVAL {
                tracing::info!("Still waiting for {:?}", pending);
                last_report = Instant::now();
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`; `true` if all set
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.pending().is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_once() {
        let dir = TempDir::new().unwrap();
        let signal = ReadinessSignal::new(dir.path(), PLOT_READY);

        assert!(!signal.is_set());
        assert!(!signal.marker().exists());
        assert!(signal.set().unwrap());
        assert!(signal.is_set());
        assert!(signal.marker().starts_with(dir.path()));

        // The first setter's pid stays in the marker
        let pid = std::fs::read_to_string(signal.marker()).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
        assert!(!signal.set().unwrap());
        assert_eq!(std::fs::read_to_string(signal.marker()).unwrap(), pid);
    }

    #[test]
    fn test_wait_returns_immediately_when_set() {
        let dir = TempDir::new().unwrap();
        let signal = ReadinessSignal::new(dir.path(), MODEL_READY);
        signal.set().unwrap();

        let start = Instant::now();
        for _ in 0..10 {
            assert_eq!(signal.wait(&ShutdownFlag::new()), WaitOutcome::Ready);
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_copies_share_state() {
        let dir = TempDir::new().unwrap();
        let signal = ReadinessSignal::new(dir.path(), PLOT_READY);
        let json = serde_json::to_string(&signal).unwrap();
        let remote: ReadinessSignal = serde_json::from_str(&json).unwrap();

        remote.set().unwrap();
        assert!(signal.is_set());
    }

    #[test]
    fn test_barrier_interrupted() {
        let dir = TempDir::new().unwrap();
        let barrier = ReadinessBarrier::new(vec![
            ReadinessSignal::new(dir.path(), PLOT_READY),
            ReadinessSignal::new(dir.path(), MODEL_READY),
        ]);
        barrier.signals()[0].set().unwrap();
        assert_eq!(barrier.pending(), vec![MODEL_READY]);

        let shutdown = ShutdownFlag::new();
        shutdown.trigger();
        assert_eq!(barrier.wait(&shutdown), WaitOutcome::Interrupted);
    }

    #[test]
    fn test_barrier_released_from_other_thread() {
        let dir = TempDir::new().unwrap();
        let plot = ReadinessSignal::new(dir.path(), PLOT_READY);
        let model = ReadinessSignal::new(dir.path(), MODEL_READY);
        let barrier = ReadinessBarrier::new(vec![plot.clone(), model.clone()]);

        let setter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            model.set().unwrap();
            plot.set().unwrap();
        });

        assert_eq!(barrier.wait(&ShutdownFlag::new()), WaitOutcome::Ready);
        setter.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_expires() {
        let dir = TempDir::new().unwrap();
        let barrier = ReadinessBarrier::new(vec![ReadinessSignal::new(dir.path(), PLOT_READY)]);
        assert!(!barrier.wait_timeout(Duration::from_millis(30)));
    }
}
