//! Abstract local datagram transport (Linux)
//!
//! Receivers bind an abstract socket name; senders bind their own name and
//! address every datagram to the receiver. One datagram is one message.

use std::io::ErrorKind;
use std::os::linux::net::SocketAddrExt;
use std::os::unix::net::{SocketAddr, UnixDatagram};
use std::time::Duration;

use super::{ChannelAddress, ChannelReceiver, ChannelSender, Received, SendOutcome, SEND_TIMEOUT};
use crate::error::{PipelineError, Result};

/// Largest message carried in one datagram
pub const MAX_DATAGRAM: usize = 64 * 1024;

fn abstract_addr(address: &ChannelAddress, name: &str) -> Result<SocketAddr> {
    SocketAddr::from_abstract_name(name.as_bytes())
        .map_err(|e| PipelineError::channel(address, e))
}

fn bind_abstract(address: &ChannelAddress, name: &str) -> Result<UnixDatagram> {
    let addr = abstract_addr(address, name)?;
    UnixDatagram::bind_addr(&addr).map_err(|e| {
        if e.kind() == ErrorKind::AddrInUse {
            PipelineError::channel(address, "address already in use")
        } else {
            PipelineError::channel(address, e)
        }
    })
}

/// Receiving end bound to an abstract name
pub struct LocalReceiver {
    socket: UnixDatagram,
    address: ChannelAddress,
    buf: Vec<u8>,
}

impl LocalReceiver {
    pub fn bind(address: &ChannelAddress, name: &str) -> Result<Self> {
        let socket = bind_abstract(address, name)?;
        Ok(Self {
            socket,
            address: address.clone(),
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }
}

impl ChannelReceiver for LocalReceiver {
    fn address(&self) -> &ChannelAddress {
        &self.address
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Received> {
        self.socket
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        match self.socket.recv(&mut self.buf) {
            Ok(n) => Ok(Received::Message(self.buf[..n].to_vec())),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Ok(Received::Idle)
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(Received::Idle),
            Err(e) => Err(PipelineError::channel(&self.address, e)),
        }
    }
}

/// Sending end bound to its own abstract name
pub struct LocalSender {
    socket: UnixDatagram,
    remote: ChannelAddress,
    remote_addr: SocketAddr,
    /// Whether the last send reached a listener, for edge-triggered logging
    reachable: bool,
}

impl LocalSender {
    pub fn open(
        own: &ChannelAddress,
        own_name: &str,
        remote: &ChannelAddress,
        remote_name: &str,
    ) -> Result<Self> {
        let socket = bind_abstract(own, own_name)?;
        // A full receive queue blocks send_to; bound it so shutdown stays prompt.
        socket
            .set_write_timeout(Some(SEND_TIMEOUT))
            .map_err(|e| PipelineError::channel(own, e))?;
        let remote_addr = abstract_addr(remote, remote_name)?;
        Ok(Self {
            socket,
            remote: remote.clone(),
            remote_addr,
            reachable: true,
        })
    }
}

impl ChannelSender for LocalSender {
    fn remote(&self) -> &ChannelAddress {
        &self.remote
    }

    fn connect(&mut self) -> Result<bool> {
        // Connectionless; every datagram carries the remote address.
        Ok(true)
    }

    fn send(&mut self, payload: &[u8]) -> Result<SendOutcome> {
        if payload.len() > MAX_DATAGRAM {
            return Err(PipelineError::Frame(format!(
                "message of {} bytes does not fit a {} byte datagram",
                payload.len(),
                MAX_DATAGRAM
            )));
        }
        match self.socket.send_to_addr(payload, &self.remote_addr) {
            Ok(_) => {
                if !self.reachable {
                    tracing::debug!("Listener on {} is reachable again", self.remote);
                    self.reachable = true;
                }
                Ok(SendOutcome::Sent)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::ConnectionRefused | ErrorKind::NotFound
                ) =>
            {
                if self.reachable {
                    tracing::debug!("No listener on {}, dropping messages", self.remote);
                    self.reachable = false;
                }
                Ok(SendOutcome::Dropped)
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                if self.reachable {
                    tracing::debug!("Listener on {} is not draining, dropping messages", self.remote);
                    self.reachable = false;
                }
                Ok(SendOutcome::Dropped)
            }
            Err(e) => Err(PipelineError::channel(&self.remote, e)),
        }
    }
}
