//! Command line arguments

use clap::Parser;

use crate::config::{LogLevel, PipelineConfig, RuntimeSettings};
use crate::error::Result;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rtt-plot",
    version,
    about = "Capture profiler events, record them and plot them live",
    after_help = "\
EXAMPLES:
    rtt-plot run1                  Record to run1.csv / run1.json
    rtt-plot run1 --log debug      Same, with debug logging

Runtime settings are read from the TOML file named by RTT_PLOT_CONFIG, if set."
)]
pub struct Args {
    /// Dataset name; events go to <NAME>.csv, descriptions to <NAME>.json
    #[arg(value_name = "DATASET_NAME")]
    pub dataset_name: String,

    /// Log level, case-insensitive: critical|fatal, error, warning|warn, info,
    /// debug, notset|trace
    #[arg(long = "log", value_name = "LEVEL", default_value = "info")]
    pub log: String,
}

impl Args {
    pub fn log_level(&self) -> Result<LogLevel> {
        LogLevel::parse(&self.log)
    }

    /// Resolve into the orchestrator configuration
    pub fn into_config(self, settings: RuntimeSettings) -> Result<PipelineConfig> {
        let log_level = self.log_level()?;
        PipelineConfig::new(self.dataset_name, log_level, settings)
    }
}
