//! Capture-Transport worker
//!
//! Binds its own send-side endpoint at construction, waits (in the
//! supervisor) until Model and Presentation are ready, then sends every
//! event-type description followed by the event stream.

use std::sync::Arc;
use std::time::Duration;

use crate::channel::{ChannelAddressSet, ChannelKind, OutboundChannels};
use crate::config::CaptureSettings;
use crate::error::Result;
use crate::shutdown::ShutdownFlag;
use crate::types::{encode, MAX_EVENT_TYPES};

use super::source::{EventSource, SourcePoll, SyntheticSource};
use super::{LoopExit, Role, Worker};

/// Source poll timeout; bounds how late the shutdown flag is observed
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub struct CaptureWorker<S: EventSource = SyntheticSource> {
    source: S,
    outbound: OutboundChannels,
    enabled_events: u32,
    filtered: u64,
}

impl CaptureWorker<SyntheticSource> {
    pub fn new(
        own: &Arc<ChannelAddressSet>,
        remote: &Arc<ChannelAddressSet>,
        settings: &CaptureSettings,
    ) -> Result<Self> {
        let source = SyntheticSource::new(settings)?;
        let outbound = OutboundChannels::bind(own, remote)?;
        Ok(Self::with_source(source, outbound, settings.enabled_events))
    }
}

impl<S: EventSource> CaptureWorker<S> {
    pub fn with_source(source: S, outbound: OutboundChannels, enabled_events: u32) -> Self {
        Self {
            source,
            outbound,
            enabled_events,
            filtered: 0,
        }
    }

    /// Whether events of `type_id` pass the enabled mask
    pub fn is_enabled(&self, type_id: u16) -> bool {
        type_id < MAX_EVENT_TYPES && self.enabled_events & (1u32 << type_id) != 0
    }

    fn send_descriptions(&mut self) -> Result<()> {
        for description in self.source.descriptions() {
            if !self.is_enabled(description.id) {
                continue;
            }
            let payload = encode(&description)?;
            self.outbound.send(ChannelKind::Descriptions, &payload)?;
        }
        Ok(())
    }
}

impl<S: EventSource> Worker for CaptureWorker<S> {
    fn role(&self) -> Role {
        Role::CaptureTransport
    }

    fn open_transmit(&mut self) -> Result<()> {
        if !self.outbound.connect()? {
            tracing::warn!(
                "Model not reachable on {}, events will be dropped until it is",
                self.outbound.remote()
            );
        }
        tracing::debug!("Transmit open towards {}", self.outbound.remote());
        Ok(())
    }

    fn run(&mut self, shutdown: &ShutdownFlag) -> Result<LoopExit> {
        self.send_descriptions()?;

        loop {
            if shutdown.is_triggered() {
                return Ok(LoopExit::Interrupted);
            }
            match self.source.next_event(POLL_TIMEOUT)? {
                SourcePoll::Event(event) => {
                    if !self.is_enabled(event.type_id) {
                        self.filtered += 1;
                        continue;
                    }
                    let payload = encode(&event)?;
                    self.outbound.send(ChannelKind::Events, &payload)?;
                }
                SourcePoll::Pending => {}
                SourcePoll::Exhausted => {
                    tracing::info!("Event source exhausted");
                    return Ok(LoopExit::Completed);
                }
            }
        }
    }

    fn close(&mut self) {
        let stats = self.outbound.stats();
        tracing::debug!(
            "Capture stats: {} sent, {} dropped, {} filtered",
            stats.sent,
            stats.dropped,
            self.filtered
        );
    }
}
