//! Inter-process channels
//!
//! A channel carries opaque messages from one producer endpoint to one
//! consumer endpoint. Two transports exist, selected by the address family
//! of the plan:
//! - [`local`]: abstract datagram sockets, one datagram per message (Linux)
//! - [`tcp`]: loopback TCP with length-prefixed framing
//!
//! Delivery is best effort. A sender whose consumer is not listening drops
//! the message and reports [`SendOutcome::Dropped`].

pub mod address;
pub mod endpoints;
pub mod frame;
#[cfg(target_os = "linux")]
pub mod local;
pub mod tcp;

pub use address::{
    AddressFamily, AddressPlan, AddressingConfig, ChannelAddress, ChannelAddressSet, ChannelKind,
    MAX_BASE_PORT, PORT_BLOCK_LEN,
};
pub use endpoints::{InboundChannels, InboundMessage, OutboundChannels, OutboundStats};
pub use frame::{encode_frame, FrameDecoder};

use crate::error::{PipelineError, Result};
use std::time::Duration;

/// Result of one receive attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Message(Vec<u8>),
    /// Nothing arrived before the timeout
    Idle,
    /// The producer went away; the receiver stays bound
    Disconnected,
}

/// Result of one send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// No consumer was listening, or it stopped draining its channel
    Dropped,
}

/// Longest a single send may block on a consumer that is not reading
pub const SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Consumer side of one channel
pub trait ChannelReceiver: Send {
    fn address(&self) -> &ChannelAddress;

    /// Wait up to `timeout` for the next message
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Received>;
}

/// Producer side of one channel
pub trait ChannelSender: Send {
    fn remote(&self) -> &ChannelAddress;

    /// Try to reach the consumer. `Ok(false)` means nobody is listening yet.
    fn connect(&mut self) -> Result<bool>;

    fn send(&mut self, payload: &[u8]) -> Result<SendOutcome>;
}

/// Bind the consumer side of `address`
pub fn bind_receiver(address: &ChannelAddress) -> Result<Box<dyn ChannelReceiver>> {
    match address {
        ChannelAddress::LoopbackTcp { .. } => Ok(Box::new(tcp::TcpReceiver::bind(address)?)),
        #[cfg(target_os = "linux")]
        ChannelAddress::AbstractLocal { name } => {
            Ok(Box::new(local::LocalReceiver::bind(address, name)?))
        }
        #[cfg(not(target_os = "linux"))]
        ChannelAddress::AbstractLocal { .. } => Err(PipelineError::channel(
            address,
            "abstract socket names are not supported on this platform",
        )),
    }
}

/// Open the producer side from `own` to `remote`
///
/// Both addresses must belong to the same family.
pub fn open_sender(own: &ChannelAddress, remote: &ChannelAddress) -> Result<Box<dyn ChannelSender>> {
    match (own, remote) {
        (ChannelAddress::LoopbackTcp { .. }, ChannelAddress::LoopbackTcp { .. }) => {
            Ok(Box::new(tcp::TcpSender::new(own, remote)))
        }
        #[cfg(target_os = "linux")]
        (
            ChannelAddress::AbstractLocal { name: own_name },
            ChannelAddress::AbstractLocal { name: remote_name },
        ) => Ok(Box::new(local::LocalSender::open(
            own,
            own_name,
            remote,
            remote_name,
        )?)),
        #[cfg(not(target_os = "linux"))]
        (ChannelAddress::AbstractLocal { .. }, ChannelAddress::AbstractLocal { .. }) => {
            Err(PipelineError::channel(
                own,
                "abstract socket names are not supported on this platform",
            ))
        }
        _ => Err(PipelineError::channel(
            remote,
            format!("address family differs from sender address {}", own),
        )),
    }
}
