//! Model worker
//!
//! Builds the typed event model from the Capture-Transport stream: every
//! description is registered, every event is checked against its type,
//! persisted to the dataset and forwarded to Presentation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::channel::{ChannelAddressSet, ChannelKind, InboundChannels, InboundMessage, OutboundChannels};
use crate::config::Dataset;
use crate::error::{Result, ResultExt};
use crate::shutdown::ShutdownFlag;
use crate::types::{decode, encode, Admission, EventRecord, EventTypeDescription, EventTypeRegistry};

use super::dataset::DatasetWriter;
use super::{LoopExit, Role, Worker};

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// How often the event log is flushed to disk
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

pub struct ModelWorker {
    inbound: InboundChannels,
    outbound: OutboundChannels,
    registry: EventTypeRegistry,
    writer: DatasetWriter,
    rejected: u64,
    last_flush: Instant,
}

impl ModelWorker {
    /// Bind the inbound set, open the hop to Presentation and create the
    /// dataset files, in that order
    pub fn new(
        inbound: &Arc<ChannelAddressSet>,
        own: &Arc<ChannelAddressSet>,
        remote: &Arc<ChannelAddressSet>,
        dataset: &Dataset,
    ) -> Result<Self> {
        let inbound = InboundChannels::bind(inbound).context("Model inbound")?;
        let mut outbound = OutboundChannels::bind(own, remote).context("Model outbound")?;
        if !outbound.connect()? {
            tracing::debug!("Presentation not reachable yet on {}", remote);
        }
        let writer = DatasetWriter::create(dataset)?;

        Ok(Self {
            inbound,
            outbound,
            registry: EventTypeRegistry::new(),
            writer,
            rejected: 0,
            last_flush: Instant::now(),
        })
    }

    pub fn registry(&self) -> &EventTypeRegistry {
        &self.registry
    }

    fn handle(&mut self, message: InboundMessage) -> Result<()> {
        match message.kind {
            ChannelKind::Descriptions => {
                let description: EventTypeDescription = match decode(&message.payload) {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Skipping description: {}", e);
                        return Ok(());
                    }
                };
                self.on_description(description)
            }
            ChannelKind::Events => {
                let event: EventRecord = match decode(&message.payload) {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::warn!("Skipping event: {}", e);
                        return Ok(());
                    }
                };
                let admission = self.registry.admit(event);
                self.on_admission(admission)
            }
        }
    }

    fn on_description(&mut self, description: EventTypeDescription) -> Result<()> {
        let payload = encode(&description)?;
        let released = match self.registry.register(description) {
            Ok(released) => released,
            Err(e) => {
                tracing::warn!("Ignoring description: {}", e);
                return Ok(());
            }
        };
        self.writer.write_descriptions(self.registry.descriptions())?;
        self.outbound.send(ChannelKind::Descriptions, &payload)?;

        for admission in released {
            self.on_admission(admission)?;
        }
        Ok(())
    }

    fn on_admission(&mut self, admission: Admission) -> Result<()> {
        match admission {
            Admission::Accepted(event) => {
                let name = self
                    .registry
                    .get(event.type_id)
                    .map(|d| d.name.as_str())
                    .unwrap_or("");
                self.writer.append(&event, name)?;
                let payload = encode(&event)?;
                self.outbound.send(ChannelKind::Events, &payload)?;
            }
            Admission::Deferred => {}
            Admission::Rejected { type_id, reason } => {
                self.rejected += 1;
                tracing::warn!("Rejected event of type {}: {}", type_id, reason);
            }
        }
        Ok(())
    }
}

impl Worker for ModelWorker {
    fn role(&self) -> Role {
        Role::Model
    }

    fn run(&mut self, shutdown: &ShutdownFlag) -> Result<LoopExit> {
        loop {
            if shutdown.is_triggered() {
                return Ok(LoopExit::Interrupted);
            }
            if let Some(message) = self.inbound.recv_timeout(RECV_TIMEOUT) {
                self.handle(message)?;
            }
            if self.last_flush.elapsed() >= FLUSH_INTERVAL {
                self.writer.flush()?;
                self.last_flush = Instant::now();
            }
        }
    }

    fn close(&mut self) {
        self.inbound.close();
        if let Err(e) = self.writer.flush() {
            tracing::error!("Failed to flush event log: {}", e);
        }
        if let Err(e) = self.writer.write_descriptions(self.registry.descriptions()) {
            tracing::error!("Failed to write descriptions: {}", e);
        }
        let stats = self.outbound.stats();
        tracing::debug!(
            "Model stats: {} rows, {} rejected, {} pending, {} forwarded, {} dropped",
            self.writer.rows(),
            self.rejected,
            self.registry.pending_len(),
            stats.sent,
            stats.dropped
        );
    }
}
