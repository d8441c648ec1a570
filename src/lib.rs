//! # rtt-plot: real-time profiler pipeline
//!
//! Streams profiler events from a target through three cooperating worker
//! processes:
//!
//! ```text
//! Capture-Transport ──► Model ──► Presentation
//!                        │
//!                        └──► <dataset>.csv, <dataset>.json
//! ```
//!
//! ## Architecture
//!
//! - **Orchestrator**: computes every channel address up front, launches the
//!   workers (consumers first) and joins them, killing stragglers after a
//!   grace period once interrupted
//! - **Channels**: abstract local datagram sockets on Linux, loopback TCP
//!   elsewhere; each hop carries a `descriptions` and an `events` channel
//! - **Readiness barrier**: Capture-Transport transmits only after Model and
//!   Presentation have bound their receivers
//! - **Supervision**: each worker closes exactly once, whatever ends it
//!
//! ## Example
//!
//! ```ignore
//! use rtt_plot::{
//!     config::{LogLevel, PipelineConfig, RuntimeSettings},
//!     orchestrator::{Orchestrator, ProcessLauncher},
//!     shutdown::{install_signal_handler, ShutdownFlag},
//! };
//!
//! let config = PipelineConfig::new("run1", LogLevel::Info, RuntimeSettings::default())?;
//! let shutdown = ShutdownFlag::new();
//! install_signal_handler(shutdown.clone())?;
//!
//! let report = Orchestrator::new(config, shutdown).run(&ProcessLauncher::current()?)?;
//! assert!(report.is_clean());
//! ```

pub mod channel;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod readiness;
pub mod shutdown;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use config::{Dataset, LogLevel, PipelineConfig, RuntimeSettings};
pub use error::{PipelineError, Result};
pub use orchestrator::{Orchestrator, PipelineReport};
pub use readiness::{ReadinessBarrier, ReadinessSignal};
pub use shutdown::ShutdownFlag;
pub use worker::{Role, WorkerExit};
