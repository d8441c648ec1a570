//! Per-worker channel endpoints
//!
//! A worker never touches individual channels. Consumers hold an
//! [`InboundChannels`] that binds both receivers of their inbound set and
//! merges them into one queue; producers hold an [`OutboundChannels`] pairing
//! the two senders of a hop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use super::{
    bind_receiver, open_sender, ChannelAddressSet, ChannelKind, ChannelReceiver, ChannelSender,
    Received, SendOutcome,
};
use crate::error::{Result, ResultExt};

/// Messages buffered between the reader threads and the worker loop
pub const INBOUND_CAPACITY: usize = 1024;

/// Reader poll interval; bounds how long `close` waits for a reader
const READ_POLL: Duration = Duration::from_millis(50);

/// One message taken off an inbound channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub kind: ChannelKind,
    pub payload: Vec<u8>,
}

/// Both receivers of a consumer's inbound set
pub struct InboundChannels {
    set: Arc<ChannelAddressSet>,
    rx: Receiver<InboundMessage>,
    stop: Arc<AtomicBool>,
    readers: Vec<JoinHandle<()>>,
}

impl InboundChannels {
    /// Bind both receivers. Returns once both addresses are bound.
    pub fn bind(set: &Arc<ChannelAddressSet>) -> Result<Self> {
        let mut receivers = Vec::with_capacity(2);
        for (kind, address) in set.iter() {
            let receiver = bind_receiver(address)
                .with_context(|| format!("Failed to bind {} receiver", kind))?;
            receivers.push((kind, receiver));
        }
        tracing::debug!("Bound inbound set {}", set);

        let (tx, rx) = bounded(INBOUND_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let mut readers = Vec::with_capacity(receivers.len());
        for (kind, receiver) in receivers {
            let tx = tx.clone();
            let stop = Arc::clone(&stop);
            let handle = std::thread::Builder::new()
                .name(format!("inbound-{}", kind))
                .spawn(move || read_loop(kind, receiver, tx, stop))?;
            readers.push(handle);
        }

        Ok(Self {
            set: Arc::clone(set),
            rx,
            stop,
            readers,
        })
    }

    pub fn set(&self) -> &Arc<ChannelAddressSet> {
        &self.set
    }

    /// Next message from either channel, or `None` after `timeout`
    pub fn recv_timeout(&self, timeout: Duration) -> Option<InboundMessage> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Stop the readers and release both addresses
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.readers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("Inbound reader panicked");
            }
        }
    }
}

impl Drop for InboundChannels {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop(
    kind: ChannelKind,
    mut receiver: Box<dyn ChannelReceiver>,
    tx: Sender<InboundMessage>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        let payload = match receiver.recv_timeout(READ_POLL) {
            Ok(Received::Message(payload)) => payload,
            Ok(Received::Idle) | Ok(Received::Disconnected) => continue,
            Err(e) => {
                tracing::warn!("Receive on {} failed: {}", receiver.address(), e);
                std::thread::sleep(READ_POLL);
                continue;
            }
        };

        let mut message = InboundMessage { kind, payload };
        loop {
            match tx.send_timeout(message, READ_POLL) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(m)) => {
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    message = m;
                }
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }
    tracing::trace!("Reader for {} stopped", receiver.address());
}

/// Send-side counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OutboundStats {
    pub sent: u64,
    pub dropped: u64,
}

/// Both senders of one hop
pub struct OutboundChannels {
    remote: Arc<ChannelAddressSet>,
    descriptions: Box<dyn ChannelSender>,
    events: Box<dyn ChannelSender>,
    stats: OutboundStats,
}

impl OutboundChannels {
    /// Open the send side from `own` towards the consumer's inbound set
    pub fn bind(own: &Arc<ChannelAddressSet>, remote: &Arc<ChannelAddressSet>) -> Result<Self> {
        let descriptions = open_sender(&own.descriptions, &remote.descriptions)
            .context("Failed to open descriptions sender")?;
        let events =
            open_sender(&own.events, &remote.events).context("Failed to open events sender")?;
        Ok(Self {
            remote: Arc::clone(remote),
            descriptions,
            events,
            stats: OutboundStats::default(),
        })
    }

    pub fn remote(&self) -> &Arc<ChannelAddressSet> {
        &self.remote
    }

    /// Try to reach both consumer channels
    pub fn connect(&mut self) -> Result<bool> {
        let descriptions = self.descriptions.connect()?;
        let events = self.events.connect()?;
        Ok(descriptions && events)
    }

    pub fn send(&mut self, kind: ChannelKind, payload: &[u8]) -> Result<SendOutcome> {
        let sender = match kind {
            ChannelKind::Descriptions => &mut self.descriptions,
            ChannelKind::Events => &mut self.events,
        };
        let outcome = sender.send(payload)?;
        match outcome {
            SendOutcome::Sent => self.stats.sent += 1,
            SendOutcome::Dropped => self.stats.dropped += 1,
        }
        Ok(outcome)
    }

    pub fn stats(&self) -> OutboundStats {
        self.stats
    }
}
