//! Process-wide shutdown flag and OS signal handling
//!
//! Every process (orchestrator and workers) installs exactly one handler.
//! The handler never does work itself; it raises a [`ShutdownFlag`] that the
//! blocking loops poll.
//!
//! On Unix SIGINT, SIGTERM and SIGQUIT are handled; elsewhere only Ctrl-C.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, ResultExt};

/// Slice used by [`ShutdownFlag::sleep`]
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Shared, one-way shutdown request
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless triggered first; returns whether triggered
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            std::thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl-C"
    }
}

/// Route termination signals to `flag`
///
/// Handlers are registered before this returns, so a signal delivered right
/// afterwards is not lost. Repeated signals only log again.
pub fn install_signal_handler(flag: ShutdownFlag) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .context("Failed to build signal runtime")?;

    let mut signals = {
        let _guard = runtime.enter();
        Signals::register().context("Failed to register signal handlers")?
    };

    std::thread::Builder::new()
        .name("shutdown-signals".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    let name = signals.recv().await;
                    if flag.is_triggered() {
                        tracing::debug!("Received {} while already shutting down", name);
                    } else {
                        tracing::info!("Received {}, shutting down", name);
                    }
                    flag.trigger();
                }
            })
        })
        .context("Failed to spawn signal thread")?;

    Ok(())
}
