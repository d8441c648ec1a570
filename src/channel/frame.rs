//! Length-prefixed framing for stream transports
//!
//! Every frame is a 4-byte little-endian payload length followed by the
//! payload. Datagram transports do not need this; each datagram is already
//! one message.

use crate::error::{PipelineError, Result};

/// Size of the length prefix
pub const HEADER_SIZE: usize = 4;

/// Largest payload accepted on a stream channel (16 MiB)
pub const MAX_FRAME_PAYLOAD: usize = 16 * 1024 * 1024;

/// Prefix a payload with its length
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(PipelineError::Frame(format!(
            "payload of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_FRAME_PAYLOAD
        )));
    }
    let len = payload.len() as u32;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Reassembles frames from arbitrarily split reads
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Take the next complete frame, if one is buffered
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&self.buffer[..HEADER_SIZE]);
        let len = u32::from_le_bytes(header) as usize;
        if len > MAX_FRAME_PAYLOAD {
            self.buffer.clear();
            return Err(PipelineError::Frame(format!(
                "announced frame of {} bytes exceeds the {} byte limit",
                len, MAX_FRAME_PAYLOAD
            )));
        }
        if self.buffer.len() < HEADER_SIZE + len {
            return Ok(None);
        }
        let payload = self.buffer[HEADER_SIZE..HEADER_SIZE + len].to_vec();
        self.buffer.drain(..HEADER_SIZE + len);
        Ok(Some(payload))
    }

    /// Bytes waiting for the rest of their frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop partial data, e.g. after the peer disconnected
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
