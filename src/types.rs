//! Core data types carried over the pipeline channels
//!
//! This module contains the messages every worker agrees on, and the typed
//! event model built from them.
//!
//! # Main Types
//!
//! - [`EventTypeDescription`] - Name and argument layout of one event type,
//!   sent on the `descriptions` channel
//! - [`EventRecord`] - One occurrence of an event, sent on the `events` channel
//! - [`EventTypeRegistry`] - Validates events against their descriptions and
//!   holds back events whose description has not arrived yet
//!
//! # Wire format
//!
//! Each message is one JSON document. Descriptions and events travel on
//! separate channels, so an event may overtake the description of its type;
//! the registry buffers such events until the description shows up.

use crate::error::{PipelineError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Maximum number of event types (one bit each in the enabled-events mask)
pub const MAX_EVENT_TYPES: u16 = 32;

/// Events held back while their description is missing
pub const MAX_PENDING_EVENTS: usize = 10_000;

/// Type of a single event argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    U8,
    S8,
    U16,
    S16,
    U32,
    S32,
    String,
    Timestamp,
}

impl ArgKind {
    /// Whether a value is representable as this kind
    pub fn accepts(&self, value: &ArgValue) -> bool {
        match (self, value) {
            (ArgKind::String, ArgValue::Text(_)) => true,
            (ArgKind::String, ArgValue::Int(_)) => false,
            (_, ArgValue::Text(_)) => false,
            (kind, ArgValue::Int(v)) => {
                let (min, max) = kind.int_range();
                (min..=max).contains(v)
            }
        }
    }

    fn int_range(&self) -> (i64, i64) {
        match self {
            ArgKind::U8 => (0, u8::MAX as i64),
            ArgKind::S8 => (i8::MIN as i64, i8::MAX as i64),
            ArgKind::U16 => (0, u16::MAX as i64),
            ArgKind::S16 => (i16::MIN as i64, i16::MAX as i64),
            ArgKind::U32 | ArgKind::Timestamp => (0, u32::MAX as i64),
            ArgKind::S32 => (i32::MIN as i64, i32::MAX as i64),
            ArgKind::String => (0, -1),
        }
    }
}

/// Named argument of an event type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgDescription {
    pub name: String,
    pub kind: ArgKind,
}

impl ArgDescription {
    pub fn new(name: impl Into<String>, kind: ArgKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Description of one event type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTypeDescription {
    pub id: u16,
    pub name: String,
    pub args: Vec<ArgDescription>,
}

impl EventTypeDescription {
    pub fn new(id: u16, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Builder-style argument append
    pub fn with_arg(mut self, name: impl Into<String>, kind: ArgKind) -> Self {
        self.args.push(ArgDescription::new(name, kind));
        self
    }
}

/// Argument value of an event occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Int(i64),
    Text(String),
}

impl std::fmt::Display for ArgValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgValue::Int(v) => write!(f, "{}", v),
            ArgValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One event occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub type_id: u16,
    /// Seconds since capture start
    pub timestamp: f64,
    pub data: Vec<ArgValue>,
}

impl EventRecord {
    pub fn new(type_id: u16, timestamp: f64, data: Vec<ArgValue>) -> Self {
        Self {
            type_id,
            timestamp,
            data,
        }
    }
}

/// Encode a message for a channel
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// Decode a message received on a channel
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload)
        .map_err(|e| PipelineError::Frame(format!("undecodable payload: {}", e)))
}

// ==================== Registry ====================

/// What happened to an event offered to the registry
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Event matches its description
    Accepted(EventRecord),
    /// Description not known yet, event held back
    Deferred,
    /// Event does not match its description
    Rejected { type_id: u16, reason: String },
}

/// Typed event model: known event types plus events waiting for theirs
#[derive(Debug)]
pub struct EventTypeRegistry {
    types: BTreeMap<u16, EventTypeDescription>,
    pending: VecDeque<EventRecord>,
    max_pending: usize,
    dropped_pending: u64,
}

impl Default for EventTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::with_pending_limit(MAX_PENDING_EVENTS)
    }

    pub fn with_pending_limit(max_pending: usize) -> Self {
        Self {
            types: BTreeMap::new(),
            pending: VecDeque::new(),
            max_pending,
            dropped_pending: 0,
        }
    }

    /// Register a description and release events that were waiting for it
    ///
    /// Re-registering an identical description is a no-op. A changed
    /// description replaces the old one.
    pub fn register(&mut self, description: EventTypeDescription) -> Result<Vec<Admission>> {
        if description.id >= MAX_EVENT_TYPES {
            return Err(PipelineError::Frame(format!(
                "event type id {} exceeds the maximum of {}",
                description.id,
                MAX_EVENT_TYPES - 1
            )));
        }

        let id = description.id;
        match self.types.get(&id) {
            Some(existing) if *existing == description => return Ok(Vec::new()),
            Some(existing) => {
                tracing::warn!(
                    "Event type {} redefined ('{}' -> '{}')",
                    id,
                    existing.name,
                    description.name
                );
            }
            None => {
                tracing::debug!("Registered event type {} '{}'", id, description.name);
            }
        }
        self.types.insert(id, description);

        let (ready, waiting): (VecDeque<_>, VecDeque<_>) =
            self.pending.drain(..).partition(|e| e.type_id == id);
        self.pending = waiting;

        Ok(ready.into_iter().map(|e| self.check(e)).collect())
    }

    /// Offer an event to the model
    pub fn admit(&mut self, event: EventRecord) -> Admission {
        if !self.types.contains_key(&event.type_id) {
            if self.pending.len() >= self.max_pending {
                self.pending.pop_front();
                self.dropped_pending += 1;
            }
            self.pending.push_back(event);
            return Admission::Deferred;
        }
        self.check(event)
    }

    fn check(&self, event: EventRecord) -> Admission {
        let Some(description) = self.types.get(&event.type_id) else {
            return Admission::Rejected {
                type_id: event.type_id,
                reason: "unknown event type".to_string(),
            };
        };

        if description.args.len() != event.data.len() {
            return Admission::Rejected {
                type_id: event.type_id,
                reason: format!(
                    "'{}' expects {} arguments, got {}",
                    description.name,
                    description.args.len(),
                    event.data.len()
                ),
            };
        }

        if let Some((arg, value)) = description
            .args
            .iter()
            .zip(event.data.iter())
            .find(|(arg, value)| !arg.kind.accepts(value))
        {
            return Admission::Rejected {
                type_id: event.type_id,
                reason: format!(
                    "'{}' argument '{}' does not accept {:?}",
                    description.name, arg.name, value
                ),
            };
        }

        Admission::Accepted(event)
    }

    pub fn get(&self, id: u16) -> Option<&EventTypeDescription> {
        self.types.get(&id)
    }

    /// Known descriptions ordered by id
    pub fn descriptions(&self) -> impl Iterator<Item = &EventTypeDescription> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Events evicted from the pending queue because it was full
    pub fn dropped_pending(&self) -> u64 {
        self.dropped_pending
    }
}
