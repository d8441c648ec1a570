//! Dataset persistence for the Model worker
//!
//! `<name>.csv` holds one row per processed event; `<name>.json` holds the
//! event-type descriptions seen so far and is rewritten whenever a new one
//! arrives.

use std::fs::File;
use std::io::{BufWriter, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Dataset;
use crate::error::{Result, ResultExt};
use crate::types::{ArgValue, EventRecord, EventTypeDescription};

/// CSV header; event arguments follow as extra columns
pub const CSV_HEADER: &str = "type_id,event,timestamp,data...";

/// Content of `<name>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptionsFile {
    /// When the recording started
    pub recorded_at: DateTime<Utc>,
    pub dataset: String,
    pub event_types: Vec<EventTypeDescription>,
}

/// Writes the two dataset files
pub struct DatasetWriter {
    dataset: Dataset,
    events: BufWriter<File>,
    recorded_at: DateTime<Utc>,
    rows: u64,
}

impl DatasetWriter {
    /// Create (truncate) both files
    pub fn create(dataset: &Dataset) -> Result<Self> {
        let path = dataset.events_csv();
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut events = BufWriter::new(file);
        writeln!(events, "{}", CSV_HEADER)?;

        let writer = Self {
            dataset: dataset.clone(),
            events,
            recorded_at: Utc::now(),
            rows: 0,
        };
        writer.write_descriptions(std::iter::empty())?;
        tracing::info!(
            "Recording to {} and {}",
            dataset.events_csv().display(),
            dataset.descriptions_json().display()
        );
        Ok(writer)
    }

    /// Append one event row
    pub fn append(&mut self, event: &EventRecord, event_name: &str) -> Result<()> {
        write!(
            self.events,
            "{},{},{}",
            event.type_id,
            csv_field(event_name),
            event.timestamp
        )?;
        for value in &event.data {
            match value {
                ArgValue::Int(v) => write!(self.events, ",{}", v)?,
                ArgValue::Text(s) => write!(self.events, ",{}", csv_field(s))?,
            }
        }
        writeln!(self.events)?;
        self.rows += 1;
        Ok(())
    }

    /// Rewrite `<name>.json` with `descriptions`
    pub fn write_descriptions<'a>(
        &self,
        descriptions: impl Iterator<Item = &'a EventTypeDescription>,
    ) -> Result<()> {
        let file = DescriptionsFile {
            recorded_at: self.recorded_at,
            dataset: self.dataset.name().to_string(),
            event_types: descriptions.cloned().collect(),
        };
        let path = self.dataset.descriptions_json();
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.events.flush().context("Failed to flush event log")
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }
}

/// Quote a field if it would break the row
fn csv_field(value: &str) -> std::borrow::Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\"")).into()
    } else {
        value.into()
    }
}
