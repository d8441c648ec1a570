//! Tracing subscriber setup shared by the orchestrator and the workers
//!
//! All processes write to stderr through a non-blocking writer. The level
//! from `--log` is the default directive; `RUST_LOG` directives are layered
//! on top of it.

use std::io::IsTerminal;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogLevel;

/// Install the global subscriber
///
/// Keep the returned guard alive until the process exits, otherwise buffered
/// lines are lost. A second call leaves the first subscriber in place.
pub fn init(level: LogLevel) -> WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let filter = EnvFilter::builder()
        .with_default_directive(level.as_level_filter().into())
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal()),
        )
        .try_init();

    guard
}
