//! Rolling per-event-type view rendered by the Presentation worker

use std::collections::{BTreeMap, VecDeque};

use crate::types::{ArgValue, EventRecord, EventTypeDescription};

#[derive(Debug, Default)]
struct Series {
    /// (timestamp, first numeric argument)
    points: VecDeque<(f64, Option<f64>)>,
    total: u64,
}

/// Summary of one event type over the visible window
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSummary {
    pub type_id: u16,
    pub name: String,
    pub total: u64,
    pub in_window: usize,
    pub rate_hz: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub last: Option<f64>,
}

/// Live plot state: a sliding time window per event type
#[derive(Debug)]
pub struct LivePlot {
    window_secs: f64,
    names: BTreeMap<u16, String>,
    series: BTreeMap<u16, Series>,
    latest: f64,
}

impl LivePlot {
    pub fn new(window_secs: f64) -> Self {
        Self {
            window_secs: window_secs.max(f64::EPSILON),
            names: BTreeMap::new(),
            series: BTreeMap::new(),
            latest: 0.0,
        }
    }

    pub fn describe(&mut self, description: &EventTypeDescription) {
        self.names.insert(description.id, description.name.clone());
    }

    pub fn push(&mut self, event: &EventRecord) {
        let value = event.data.iter().find_map(|v| match v {
            ArgValue::Int(i) => Some(*i as f64),
            ArgValue::Text(_) => None,
        });
        let series = self.series.entry(event.type_id).or_default();
        series.points.push_back((event.timestamp, value));
        series.total += 1;

        if event.timestamp > self.latest {
            self.latest = event.timestamp;
        }
        let cutoff = self.latest - self.window_secs;
        for series in self.series.values_mut() {
            while series.points.front().is_some_and(|(t, _)| *t < cutoff) {
                series.points.pop_front();
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn summaries(&self) -> Vec<SeriesSummary> {
        self.series
            .iter()
            .map(|(&type_id, series)| {
                let values = series.points.iter().filter_map(|(_, v)| *v);
                SeriesSummary {
                    type_id,
                    name: self
                        .names
                        .get(&type_id)
                        .cloned()
                        .unwrap_or_else(|| format!("type {}", type_id)),
                    total: series.total,
                    in_window: series.points.len(),
                    rate_hz: series.points.len() as f64 / self.window_secs,
                    min: values.clone().reduce(f64::min),
                    max: values.clone().reduce(f64::max),
                    last: series.points.back().and_then(|(_, v)| *v),
                }
            })
            .collect()
    }

    /// Log one line per event type
    pub fn render(&self) {
        if self.is_empty() {
            tracing::info!("No events yet");
            return;
        }
        for s in self.summaries() {
            match (s.min, s.max, s.last) {
                (Some(min), Some(max), Some(last)) => tracing::info!(
                    "{:<14} {:>8} total {:>7.1}/s  last {:>10.1}  range [{:.1}, {:.1}]",
                    s.name,
                    s.total,
                    s.rate_hz,
                    last,
                    min,
                    max
                ),
                _ => tracing::info!("{:<14} {:>8} total {:>7.1}/s", s.name, s.total, s.rate_hz),
            }
        }
    }
}
