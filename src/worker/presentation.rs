//! Presentation worker
//!
//! Consumes the Model's descriptions and events and renders the live plot
//! every refresh interval. It has no outbound channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::channel::{ChannelAddressSet, ChannelKind, InboundChannels, InboundMessage};
use crate::config::PresentationSettings;
use crate::error::{Result, ResultExt};
use crate::shutdown::ShutdownFlag;
use crate::types::{decode, EventRecord, EventTypeDescription};

use super::plot::LivePlot;
use super::{LoopExit, Role, Worker};

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

pub struct PresentationWorker {
    inbound: InboundChannels,
    plot: LivePlot,
    refresh: Duration,
    last_render: Instant,
}

impl PresentationWorker {
    pub fn new(inbound: &Arc<ChannelAddressSet>, settings: &PresentationSettings) -> Result<Self> {
        let inbound = InboundChannels::bind(inbound).context("Presentation inbound")?;
        Ok(Self {
            inbound,
            plot: LivePlot::new(settings.window_secs),
            refresh: settings.refresh_interval(),
            last_render: Instant::now(),
        })
    }

    pub fn plot(&self) -> &LivePlot {
        &self.plot
    }

    fn handle(&mut self, message: InboundMessage) {
        match message.kind {
            ChannelKind::Descriptions => match decode::<EventTypeDescription>(&message.payload) {
                Ok(description) => self.plot.describe(&description),
                Err(e) => tracing::warn!("Skipping description: {}", e),
            },
            ChannelKind::Events => match decode::<EventRecord>(&message.payload) {
                Ok(event) => self.plot.push(&event),
                Err(e) => tracing::warn!("Skipping event: {}", e),
            },
        }
    }
}

impl Worker for PresentationWorker {
    fn role(&self) -> Role {
        Role::Presentation
    }

    fn run(&mut self, shutdown: &ShutdownFlag) -> Result<LoopExit> {
        loop {
            if shutdown.is_triggered() {
                return Ok(LoopExit::Interrupted);
            }
            if let Some(message) = self.inbound.recv_timeout(RECV_TIMEOUT) {
                self.handle(message);
            }
            if self.last_render.elapsed() >= self.refresh {
                self.plot.render();
                self.last_render = Instant::now();
            }
        }
    }

    fn close(&mut self) {
        self.inbound.close();
        if !self.plot.is_empty() {
            self.plot.render();
        }
    }
}
