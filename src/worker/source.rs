//! Event sources for the Capture-Transport worker
//!
//! The worker only sees the [`EventSource`] trait. The bundled
//! [`SyntheticSource`] emits a fixed set of event types at a steady rate,
//! standing in for a target that streams profiler events over RTT.

use std::f64::consts::TAU;
use std::time::{Duration, Instant};

use crate::config::CaptureSettings;
use crate::error::{PipelineError, Result};
use crate::types::{ArgKind, ArgValue, EventRecord, EventTypeDescription};

/// Result of polling a source
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePoll {
    Event(EventRecord),
    /// Nothing yet; poll again
    Pending,
    /// The source has nothing more to give
    Exhausted,
}

/// Anything that produces profiler events
pub trait EventSource: Send {
    /// Event types this source can emit
    fn descriptions(&self) -> Vec<EventTypeDescription>;

    /// Wait up to `timeout` for the next event
    fn next_event(&mut self, timeout: Duration) -> Result<SourcePoll>;
}

pub const SINE_EVENT: u16 = 0;
pub const COUNTER_EVENT: u16 = 1;
pub const TASK_SWITCH_EVENT: u16 = 2;

const SINE_FREQUENCY_HZ: f64 = 0.5;
const SINE_AMPLITUDE: f64 = 1000.0;
const TASK_NAMES: [&str; 3] = ["idle", "sensor", "comms"];

/// Rate-limited generator of sine samples, a counter and task switches
#[derive(Debug)]
pub struct SyntheticSource {
    period: Duration,
    started: Instant,
    next_due: Instant,
    emitted: u64,
    max_events: Option<u64>,
}

impl SyntheticSource {
    pub fn new(settings: &CaptureSettings) -> Result<Self> {
        if settings.rate_hz == 0 {
            return Err(PipelineError::Source(
                "capture rate must be at least 1 Hz".to_string(),
            ));
        }
        let now = Instant::now();
        Ok(Self {
            period: Duration::from_secs_f64(1.0 / settings.rate_hz as f64),
            started: now,
            next_due: now,
            emitted: 0,
            max_events: settings.max_events,
        })
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn make_event(&mut self) -> EventRecord {
        let t = self.started.elapsed().as_secs_f64();
        let n = self.emitted;
        self.emitted += 1;

        match n % 3 {
            0 => {
                let value = (SINE_AMPLITUDE * (TAU * SINE_FREQUENCY_HZ * t).sin()).round() as i64;
                EventRecord::new(SINE_EVENT, t, vec![ArgValue::Int(value)])
            }
            1 => EventRecord::new(
                COUNTER_EVENT,
                t,
                vec![ArgValue::Int((n / 3) as i64 % (u32::MAX as i64 + 1))],
            ),
            _ => {
                let task = (n / 3) as usize % TASK_NAMES.len();
                EventRecord::new(
                    TASK_SWITCH_EVENT,
                    t,
                    vec![
                        ArgValue::Text(TASK_NAMES[task].to_string()),
                        ArgValue::Int(task as i64),
                    ],
                )
            }
        }
    }
}

impl EventSource for SyntheticSource {
    fn descriptions(&self) -> Vec<EventTypeDescription> {
        vec![
            EventTypeDescription::new(SINE_EVENT, "sine").with_arg("value", ArgKind::S32),
            EventTypeDescription::new(COUNTER_EVENT, "counter").with_arg("count", ArgKind::U32),
            EventTypeDescription::new(TASK_SWITCH_EVENT, "task_switch")
                .with_arg("task", ArgKind::String)
                .with_arg("priority", ArgKind::U8),
        ]
    }

    fn next_event(&mut self, timeout: Duration) -> Result<SourcePoll> {
        if self.max_events.is_some_and(|max| self.emitted >= max) {
            return Ok(SourcePoll::Exhausted);
        }

        let now = Instant::now();
        if now < self.next_due {
            let wait = self.next_due - now;
            if wait > timeout {
                std::thread::sleep(timeout);
                return Ok(SourcePoll::Pending);
            }
            std::thread::sleep(wait);
        }

        self.next_due += self.period;
        // Don't burst to catch up after a stall.
        let now = Instant::now();
        if self.next_due + self.period < now {
            self.next_due = now;
        }
        Ok(SourcePoll::Event(self.make_event()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Admission, EventTypeRegistry};

    fn settings(rate_hz: u32, max_events: Option<u64>) -> CaptureSettings {
        CaptureSettings {
            rate_hz,
            max_events,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(SyntheticSource::new(&settings(0, None)).is_err());
    }

    #[test]
    fn test_exhausts_after_limit() {
        let mut source = SyntheticSource::new(&settings(10_000, Some(5))).unwrap();
        let mut events = 0;
        loop {
            match source.next_event(Duration::from_millis(50)).unwrap() {
                SourcePoll::Event(_) => events += 1,
                SourcePoll::Pending => {}
                SourcePoll::Exhausted => break,
            }
        }
        assert_eq!(events, 5);
        assert_eq!(source.emitted(), 5);
    }

    #[test]
    fn test_events_match_own_descriptions() {
        let mut source = SyntheticSource::new(&settings(10_000, Some(30))).unwrap();
        let mut registry = EventTypeRegistry::new();
        for description in source.descriptions() {
            registry.register(description).unwrap();
        }

        let mut checked = 0;
        loop {
            match source.next_event(Duration::from_millis(50)).unwrap() {
                SourcePoll::Event(event) => {
                    assert!(matches!(registry.admit(event), Admission::Accepted(_)));
                    checked += 1;
                }
                SourcePoll::Pending => {}
                SourcePoll::Exhausted => break,
            }
        }
        assert_eq!(checked, 30);
    }

    #[test]
    fn test_short_timeout_reports_pending() {
        let mut source = SyntheticSource::new(&settings(1, None)).unwrap();
        assert!(matches!(
            source.next_event(Duration::from_millis(5)).unwrap(),
            SourcePoll::Event(_)
        ));
        assert_eq!(
            source.next_event(Duration::from_millis(5)).unwrap(),
            SourcePoll::Pending
        );
    }
}
