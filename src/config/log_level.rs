//! Log verbosity selected on the command line

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing_subscriber::filter::LevelFilter;

/// Verbosity level shared by the orchestrator and every worker
///
/// Names follow the conventional level vocabulary (`critical`, `warning`,
/// `notset` included) and are matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Every accepted spelling and the level it selects
    const SPELLINGS: &'static [(&'static str, LogLevel)] = &[
        ("critical", LogLevel::Critical),
        ("fatal", LogLevel::Critical),
        ("error", LogLevel::Error),
        ("warning", LogLevel::Warning),
        ("warn", LogLevel::Warning),
        ("info", LogLevel::Info),
        ("debug", LogLevel::Debug),
        ("notset", LogLevel::Trace),
        ("trace", LogLevel::Trace),
    ];

    /// All accepted spellings, for help and error messages
    pub fn names() -> impl Iterator<Item = &'static str> {
        Self::SPELLINGS.iter().map(|(name, _)| *name)
    }

    /// Resolve a level name, case-insensitive
    pub fn parse(name: &str) -> Result<Self> {
        let wanted = name.trim().to_ascii_lowercase();
        Self::SPELLINGS
            .iter()
            .find(|(spelling, _)| *spelling == wanted.as_str())
            .map(|(_, level)| *level)
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "unknown log level '{}' (expected one of: {})",
                    name,
                    Self::names().collect::<Vec<_>>().join(", ")
                ))
            })
    }

    /// Level filter handed to the tracing subscriber
    pub fn as_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Critical | LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Critical => "critical",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        write!(f, "{}", name)
    }
}
