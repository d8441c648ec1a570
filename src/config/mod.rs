//! Configuration module for rtt-plot
//!
//! This module resolves everything the orchestrator needs before a single
//! worker is launched:
//! - The dataset name and the two output files derived from it
//! - The log verbosity shared by every process
//! - Optional runtime settings (transport family, grace period, capture rate)
//!
//! Configuration errors surface here, so an invalid `--log` value fails the
//! command before any process starts.
//!
//! # Example
//!
//! ```ignore
//! use rtt_plot::config::{LogLevel, PipelineConfig, RuntimeSettings};
//!
//! let config = PipelineConfig::new("run1", LogLevel::parse("debug")?, RuntimeSettings::default())?;
//! assert_eq!(config.dataset.events_csv(), std::path::Path::new("run1.csv"));
//! ```

pub mod log_level;
pub mod settings;

pub use log_level::LogLevel;
pub use settings::*;

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// First port of the loopback block
pub const DEFAULT_BASE_PORT: u16 = 8000;

/// Loopback host used for the TCP address family
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Default grace period between an interrupt and killing stragglers
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5000;

/// Raw event log extension
pub const EVENTS_EXTENSION: &str = "csv";

/// Event-type description extension
pub const DESCRIPTIONS_EXTENSION: &str = "json";

// ==================== Dataset ====================

/// Dataset name and the files derived from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    name: String,
}

impl Dataset {
    /// Validate a dataset name
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PipelineError::Config(
                "dataset name must not be empty".to_string(),
            ));
        }
        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<name>.csv`, the raw event log
    pub fn events_csv(&self) -> PathBuf {
        PathBuf::from(format!("{}.{}", self.name, EVENTS_EXTENSION))
    }

    /// `<name>.json`, the event-type descriptions
    pub fn descriptions_json(&self) -> PathBuf {
        PathBuf::from(format!("{}.{}", self.name, DESCRIPTIONS_EXTENSION))
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ==================== Pipeline Config ====================

/// Fully resolved orchestrator configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub dataset: Dataset,
    pub log_level: LogLevel,
    pub settings: RuntimeSettings,
}

impl PipelineConfig {
    pub fn new(
        dataset_name: impl Into<String>,
        log_level: LogLevel,
        settings: RuntimeSettings,
    ) -> Result<Self> {
        Ok(Self {
            dataset: Dataset::new(dataset_name)?,
            log_level,
            settings,
        })
    }
}
