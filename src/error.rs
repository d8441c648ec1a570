//! Error handling for the rtt-plot pipeline
//!
//! This module defines the crate error type and a Result alias used by the
//! orchestrator, the channel layer and every worker role.

use thiserror::Error;

/// Main error type for rtt-plot operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid command line or settings value
    #[error("Configuration error: {0}")]
    Config(String),

    /// A channel endpoint could not be bound or connected
    #[error("Channel error on {address}: {message}")]
    Channel { address: String, message: String },

    /// A message could not be framed or decoded
    #[error("Frame error: {0}")]
    Frame(String),

    /// Readiness marker could not be written or inspected
    #[error("Readiness error: {0}")]
    Readiness(String),

    /// A worker process could not be spawned, polled or killed
    #[error("Worker process error ({role}): {message}")]
    Process { role: String, message: String },

    /// Orchestrator asked to skip or revisit a lifecycle state
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Capture source failure
    #[error("Source error: {0}")]
    Source(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Channel error for a given address
    pub fn channel(address: impl std::fmt::Display, message: impl std::fmt::Display) -> Self {
        PipelineError::Channel {
            address: address.to_string(),
            message: message.to_string(),
        }
    }

    /// Process error for a given worker role
    pub fn process(role: impl std::fmt::Display, message: impl std::fmt::Display) -> Self {
        PipelineError::Process {
            role: role.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether the root cause is an address that is already bound
    pub fn is_addr_in_use(&self) -> bool {
        match self {
            PipelineError::Io(e) => e.kind() == std::io::ErrorKind::AddrInUse,
            PipelineError::Channel { message, .. } => message.contains("in use"),
            PipelineError::WithContext { source, .. } => source.is_addr_in_use(),
            _ => false,
        }
    }
}

/// Result type alias for rtt-plot operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PipelineError::Io(e).with_context(f()))
    }
}
