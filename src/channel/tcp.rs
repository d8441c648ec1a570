//! Loopback TCP transport
//!
//! The consumer listens; the producer connects lazily and writes
//! length-prefixed frames. The kernel picks the producer's local port, so
//! the producer's own planned address only identifies it in logs.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use super::frame::{encode_frame, FrameDecoder};
use super::{ChannelAddress, ChannelReceiver, ChannelSender, Received, SendOutcome, SEND_TIMEOUT};
use crate::error::{PipelineError, Result};

/// How long a producer waits for the consumer's listener
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(100);

/// Sleep between accept polls while no producer is connected
const ACCEPT_POLL: Duration = Duration::from_millis(5);

const READ_CHUNK: usize = 64 * 1024;

fn resolve(address: &ChannelAddress) -> Result<Vec<SocketAddr>> {
    let ChannelAddress::LoopbackTcp { host, port } = address else {
        return Err(PipelineError::channel(address, "not a loopback TCP address"));
    };
    let addrs: Vec<SocketAddr> = (host.as_str(), *port)
        .to_socket_addrs()
        .map_err(|e| PipelineError::channel(address, e))?
        .collect();
    if addrs.is_empty() {
        return Err(PipelineError::channel(address, "host did not resolve"));
    }
    Ok(addrs)
}

/// Listening end accepting one producer stream at a time
pub struct TcpReceiver {
    listener: TcpListener,
    stream: Option<TcpStream>,
    decoder: FrameDecoder,
    address: ChannelAddress,
    buf: Vec<u8>,
}

impl TcpReceiver {
    pub fn bind(address: &ChannelAddress) -> Result<Self> {
        let addrs = resolve(address)?;
        let listener = TcpListener::bind(&addrs[..]).map_err(|e| {
            if e.kind() == ErrorKind::AddrInUse {
                PipelineError::channel(address, "address already in use")
            } else {
                PipelineError::channel(address, e)
            }
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|e| PipelineError::channel(address, e))?;

        Ok(Self {
            listener,
            stream: None,
            decoder: FrameDecoder::new(),
            address: address.clone(),
            buf: vec![0u8; READ_CHUNK],
        })
    }

    fn drop_stream(&mut self) {
        self.stream = None;
        self.decoder.clear();
    }

    /// Accept a pending producer, if any
    fn try_accept(&mut self) -> Result<bool> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                let _ = stream.set_nodelay(true);
                tracing::debug!("Producer {} connected to {}", peer, self.address);
                self.stream = Some(stream);
                Ok(true)
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(false)
            }
            Err(e) => Err(PipelineError::channel(&self.address, e)),
        }
    }
}

impl ChannelReceiver for TcpReceiver {
    fn address(&self) -> &ChannelAddress {
        &self.address
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Received> {
        if let Some(frame) = self.decoder.next_frame()? {
            return Ok(Received::Message(frame));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());

            if self.stream.is_none() && !self.try_accept()? {
                if remaining.is_zero() {
                    return Ok(Received::Idle);
                }
                std::thread::sleep(remaining.min(ACCEPT_POLL));
                continue;
            }

            let Some(stream) = self.stream.as_mut() else {
                continue;
            };
            stream.set_read_timeout(Some(remaining.max(Duration::from_millis(1))))?;
            match stream.read(&mut self.buf) {
                Ok(0) => {
                    tracing::debug!("Producer disconnected from {}", self.address);
                    self.drop_stream();
                    return Ok(Received::Disconnected);
                }
                Ok(n) => {
                    self.decoder.push(&self.buf[..n]);
                    match self.decoder.next_frame() {
                        Ok(Some(frame)) => return Ok(Received::Message(frame)),
                        Ok(None) if remaining.is_zero() => return Ok(Received::Idle),
                        Ok(None) => {}
                        Err(e) => {
                            self.drop_stream();
                            return Err(e);
                        }
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(Received::Idle);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::debug!("Stream on {} failed: {}", self.address, e);
                    self.drop_stream();
                    return Ok(Received::Disconnected);
                }
            }
        }
    }
}

/// Connecting end with lazy reconnect
pub struct TcpSender {
    own: ChannelAddress,
    remote: ChannelAddress,
    stream: Option<TcpStream>,
}

impl TcpSender {
    pub fn new(own: &ChannelAddress, remote: &ChannelAddress) -> Self {
        Self {
            own: own.clone(),
            remote: remote.clone(),
            stream: None,
        }
    }
}

impl ChannelSender for TcpSender {
    fn remote(&self) -> &ChannelAddress {
        &self.remote
    }

    fn connect(&mut self) -> Result<bool> {
        if self.stream.is_some() {
            return Ok(true);
        }
        for addr in resolve(&self.remote)? {
            if let Ok(stream) = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                let _ = stream.set_nodelay(true);
                // A timed-out write leaves a partial frame; send drops the stream then.
                stream
                    .set_write_timeout(Some(SEND_TIMEOUT))
                    .map_err(|e| PipelineError::channel(&self.remote, e))?;
                tracing::debug!("{} connected to {}", self.own, self.remote);
                self.stream = Some(stream);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn send(&mut self, payload: &[u8]) -> Result<SendOutcome> {
        let frame = encode_frame(payload)?;
        if !self.connect()? {
            tracing::trace!("No listener on {}, message dropped", self.remote);
            return Ok(SendOutcome::Dropped);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(SendOutcome::Dropped);
        };
        match stream.write_all(&frame) {
            Ok(()) => Ok(SendOutcome::Sent),
            Err(e) => {
                tracing::debug!("Lost connection to {}: {}", self.remote, e);
                self.stream = None;
                Ok(SendOutcome::Dropped)
            }
        }
    }
}
