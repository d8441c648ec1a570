//! Runtime settings read once at startup
//!
//! These settings tune the pipeline without changing its shape: which
//! transport family to use, how long the orchestrator waits for workers after
//! an interrupt, and how the bundled capture source and live plot behave.
//!
//! Settings are optional. When `RTT_PLOT_CONFIG` names a TOML file it is
//! loaded, otherwise the defaults below apply.
//!
//! ```toml
//! shutdown_grace_ms = 5000
//!
//! [addressing]
//! transport = "tcp"
//! base_port = 8000
//!
//! [capture]
//! rate_hz = 200
//! max_events = 1000
//! ```

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{DEFAULT_BASE_PORT, DEFAULT_SHUTDOWN_GRACE_MS};

/// Environment variable naming the optional settings file
pub const SETTINGS_ENV: &str = "RTT_PLOT_CONFIG";

/// Top-level runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// How long to wait for workers after an interrupt before killing them
    pub shutdown_grace_ms: u64,

    /// Channel address plan inputs
    pub addressing: AddressingSettings,

    /// Bundled capture source
    pub capture: CaptureSettings,

    /// Live plot refresh
    pub presentation: PresentationSettings,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            addressing: AddressingSettings::default(),
            capture: CaptureSettings::default(),
            presentation: PresentationSettings::default(),
        }
    }
}

impl RuntimeSettings {
    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read settings {:?}: {}", path, e))
        })?;
        toml::from_str(&content).map_err(|e| {
            PipelineError::Config(format!("Failed to parse settings {:?}: {}", path, e))
        })
    }

    /// Serialize to TOML, the format [`RuntimeSettings::load`] reads
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize settings: {}", e)))
    }

    /// Save settings to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_toml()?).map_err(|e| {
            PipelineError::Config(format!("Failed to write settings {:?}: {}", path, e))
        })
    }

    /// Load from `RTT_PLOT_CONFIG` if set, defaults otherwise
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(SETTINGS_ENV) {
            Some(path) => {
                tracing::debug!("Loading runtime settings from {:?}", path);
                Self::load(path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Grace period as a duration
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Transport family preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportPreference {
    /// Abstract local sockets where the platform has them, loopback TCP elsewhere
    #[default]
    Auto,
    /// Always loopback TCP
    Tcp,
}

/// Inputs to the channel address plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressingSettings {
    pub transport: TransportPreference,
    /// First of the eight consecutive loopback ports
    pub base_port: u16,
    /// Prefix for abstract socket names, lets pipelines coexist on one host
    pub namespace: Option<String>,
}

impl Default for AddressingSettings {
    fn default() -> Self {
        Self {
            transport: TransportPreference::Auto,
            base_port: DEFAULT_BASE_PORT,
            namespace: None,
        }
    }
}

/// Bundled synthetic capture source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Events emitted per second
    pub rate_hz: u32,
    /// Stop after this many events (None = run until interrupted)
    pub max_events: Option<u64>,
    /// Bit per event type id; cleared bits are not transmitted
    pub enabled_events: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            rate_hz: 100,
            max_events: None,
            // By default, all events are profiled.
            enabled_events: u32::MAX,
        }
    }
}

/// Live plot refresh settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationSettings {
    /// Redraw interval in milliseconds
    pub refresh_ms: u64,
    /// Visible time window in seconds
    pub window_secs: f64,
}

impl Default for PresentationSettings {
    fn default() -> Self {
        Self {
            refresh_ms: 1000,
            window_secs: 10.0,
        }
    }
}

impl PresentationSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms.max(1))
    }
}
