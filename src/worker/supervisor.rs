//! Worker lifecycle
//!
//! Every role runs through [`supervise`]:
//!
//! ```text
//! build ──► startup gate ──► open transmit ──► run ──► close
//!   │        (announce or        │                │
//!   │         await barrier)     └── error ───────┤
//!   └── error: nothing to close                   └── close runs exactly once
//! ```
//!
//! The built worker lives in a [`CloseGuard`]; its `Drop` performs the close,
//! so release happens on return, on error and while unwinding from a panic.

use std::ops::{Deref, DerefMut};

use crate::error::{PipelineError, Result};
use crate::readiness::{ReadinessBarrier, ReadinessSignal, WaitOutcome};
use crate::shutdown::ShutdownFlag;

use super::{Role, EXIT_COMPLETED, EXIT_FAULTED, EXIT_INTERRUPTED, EXIT_STARTUP_FAILED};

/// How a worker's main loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The worker's own termination condition was reached
    Completed,
    /// The shutdown flag was observed
    Interrupted,
}

/// One pipeline role, constructed and ready to run
pub trait Worker {
    fn role(&self) -> Role;

    /// Start transmitting downstream. Called after the startup gate opened.
    fn open_transmit(&mut self) -> Result<()> {
        Ok(())
    }

    /// Main loop; must return promptly once `shutdown` is triggered
    fn run(&mut self, shutdown: &ShutdownFlag) -> Result<LoopExit>;

    /// Release sockets and files. Called exactly once.
    fn close(&mut self);
}

/// What a worker does between construction and its main loop
#[derive(Debug, Clone, Copy)]
pub enum StartupGate<'a> {
    None,
    /// Set this signal once constructed
    Announce(&'a ReadinessSignal),
    /// Wait for every signal of this barrier before opening transmit
    Await(&'a ReadinessBarrier),
}

/// How a supervised worker ended
#[derive(Debug)]
pub enum WorkerOutcome {
    Completed,
    Interrupted,
    /// Construction or readiness announcement failed
    StartupFailed(PipelineError),
    /// The running worker hit an error
    Faulted(PipelineError),
}

impl WorkerOutcome {
    /// Process exit status reporting this outcome to the orchestrator
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkerOutcome::Completed => EXIT_COMPLETED,
            WorkerOutcome::Interrupted => EXIT_INTERRUPTED,
            WorkerOutcome::StartupFailed(_) => EXIT_STARTUP_FAILED,
            WorkerOutcome::Faulted(_) => EXIT_FAULTED,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, WorkerOutcome::Completed | WorkerOutcome::Interrupted)
    }
}

/// Owns a worker and closes it exactly once
pub struct CloseGuard<W: Worker> {
    worker: W,
    closed: bool,
}

impl<W: Worker> CloseGuard<W> {
    pub fn new(worker: W) -> Self {
        Self {
            worker,
            closed: false,
        }
    }

    /// Close now; later calls and the drop are no-ops
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let role = self.worker.role();
        self.worker.close();
        tracing::info!("{} worker closed", role);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<W: Worker> Deref for CloseGuard<W> {
    type Target = W;

    fn deref(&self) -> &W {
        &self.worker
    }
}

impl<W: Worker> DerefMut for CloseGuard<W> {
    fn deref_mut(&mut self) -> &mut W {
        &mut self.worker
    }
}

impl<W: Worker> Drop for CloseGuard<W> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run one worker through its whole lifecycle
pub fn supervise<W, F>(
    role: Role,
    build: F,
    gate: StartupGate<'_>,
    shutdown: &ShutdownFlag,
) -> WorkerOutcome
where
    W: Worker,
    F: FnOnce() -> Result<W>,
{
    let mut worker = match build() {
        Ok(worker) => CloseGuard::new(worker),
        Err(e) => {
            tracing::error!("{} worker failed to start: {}", role, e);
            return WorkerOutcome::StartupFailed(e);
        }
    };
    tracing::debug!("{} worker constructed", role);

    match gate {
        StartupGate::None => {}
        StartupGate::Announce(signal) => {
            if let Err(e) = signal.set() {
                tracing::error!("{} worker could not announce readiness: {}", role, e);
                return WorkerOutcome::StartupFailed(e);
            }
        }
        StartupGate::Await(barrier) => {
            tracing::debug!("{} worker waiting for {:?}", role, barrier.pending());
            if barrier.wait(shutdown) == WaitOutcome::Interrupted {
                tracing::info!("{} worker interrupted before downstream was ready", role);
                return WorkerOutcome::Interrupted;
            }
        }
    }

    if let Err(e) = worker.open_transmit() {
        tracing::error!("{} worker could not open transmit: {}", role, e);
        return WorkerOutcome::Faulted(e);
    }

    tracing::info!("{} worker running", role);
    let outcome = match worker.run(shutdown) {
        Ok(LoopExit::Completed) => WorkerOutcome::Completed,
        Ok(LoopExit::Interrupted) => WorkerOutcome::Interrupted,
        Err(e) => {
            tracing::error!("{} worker failed: {}", role, e);
            WorkerOutcome::Faulted(e)
        }
    };
    worker.close();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Default, Clone)]
    struct Journal(Arc<Mutex<Vec<&'static str>>>);

    impl Journal {
        fn push(&self, entry: &'static str) {
            self.0.lock().unwrap().push(entry);
        }

        fn entries(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }
    }

    struct Scripted {
        journal: Journal,
        result: fn() -> Result<LoopExit>,
    }

    impl Worker for Scripted {
        fn role(&self) -> Role {
            Role::Model
        }

        fn open_transmit(&mut self) -> Result<()> {
            self.journal.push("open");
            Ok(())
        }

        fn run(&mut self, _shutdown: &ShutdownFlag) -> Result<LoopExit> {
            self.journal.push("run");
            (self.result)()
        }

        fn close(&mut self) {
            self.journal.push("close");
        }
    }

    fn scripted(journal: &Journal, result: fn() -> Result<LoopExit>) -> Result<Scripted> {
        Ok(Scripted {
            journal: journal.clone(),
            result,
        })
    }

    #[test]
    fn test_completed_closes_once() {
        let journal = Journal::default();
        let outcome = supervise(
            Role::Model,
            || scripted(&journal, || Ok(LoopExit::Completed)),
            StartupGate::None,
            &ShutdownFlag::new(),
        );
        assert!(matches!(outcome, WorkerOutcome::Completed));
        assert_eq!(journal.entries(), vec!["open", "run", "close"]);
    }

    #[test]
    fn test_fault_still_closes() {
        let journal = Journal::default();
        let outcome = supervise(
            Role::Model,
            || scripted(&journal, || Err(PipelineError::Source("probe lost".into()))),
            StartupGate::None,
            &ShutdownFlag::new(),
        );
        assert_eq!(outcome.exit_code(), EXIT_FAULTED);
        assert_eq!(journal.entries(), vec!["open", "run", "close"]);
    }

    #[test]
    fn test_startup_failure_has_nothing_to_close() {
        let outcome = supervise::<Scripted, _>(
            Role::Model,
            || Err(PipelineError::channel("@model_creator_ev", "address already in use")),
            StartupGate::None,
            &ShutdownFlag::new(),
        );
        assert_eq!(outcome.exit_code(), EXIT_STARTUP_FAILED);
        assert!(!outcome.is_clean());
    }

    #[test]
    fn test_announce_sets_signal_before_run() {
        let dir = TempDir::new().unwrap();
        let signal = ReadinessSignal::new(dir.path(), "model-ready");
        let journal = Journal::default();

        supervise(
            Role::Model,
            || scripted(&journal, || Ok(LoopExit::Completed)),
            StartupGate::Announce(&signal),
            &ShutdownFlag::new(),
        );
        assert!(signal.is_set());
    }

    #[test]
    fn test_interrupted_at_barrier_skips_transmit() {
        let dir = TempDir::new().unwrap();
        let barrier = ReadinessBarrier::new(vec![ReadinessSignal::new(dir.path(), "plot-ready")]);
        let journal = Journal::default();
        let shutdown = ShutdownFlag::new();
        shutdown.trigger();

        let outcome = supervise(
            Role::CaptureTransport,
            || scripted(&journal, || Ok(LoopExit::Completed)),
            StartupGate::Await(&barrier),
            &shutdown,
        );
        assert!(matches!(outcome, WorkerOutcome::Interrupted));
        assert_eq!(journal.entries(), vec!["close"]);
    }

    #[test]
    fn test_panic_in_run_closes() {
        let journal = Journal::default();
        let inner = journal.clone();
        let result = std::panic::catch_unwind(move || {
            supervise(
                Role::Presentation,
                || scripted(&inner, || panic!("renderer crashed")),
                StartupGate::None,
                &ShutdownFlag::new(),
            )
        });
        assert!(result.is_err());
        assert_eq!(journal.entries(), vec!["open", "run", "close"]);
    }

    #[test]
    fn test_guard_close_idempotent() {
        let journal = Journal::default();
        let mut guard = CloseGuard::new(scripted(&journal, || Ok(LoopExit::Completed)).unwrap());
        guard.close();
        guard.close();
        assert!(guard.is_closed());
        drop(guard);
        assert_eq!(journal.entries(), vec!["close"]);
    }
}
