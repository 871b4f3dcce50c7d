//! Length-prefixed frame envelope.
//!
//! Every frame on both connection types starts with an 8 byte header:
//! `size: u32 LE` (payload bytes, header excluded) followed by
//! `opcode: u32 LE`.

use crate::error::{ProtocolError, ProtocolResult};
use crate::opcodes::{ConnectionType, Opcode};

/// Size of the frame header in bytes.
pub const HEADER_SIZE: usize = 8;

/// Default upper bound for a single inbound payload.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub size: u32,
    pub opcode: Opcode,
}

impl FrameHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..4].copy_from_slice(&self.size.to_le_bytes());
        out[4..].copy_from_slice(&self.opcode.raw().to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        let size = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let opcode = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Self {
            size,
            opcode: Opcode(opcode),
        }
    }

    /// Returns the payload length if it is within `max_frame_size`.
    pub fn payload_len(&self, max_frame_size: usize) -> ProtocolResult<usize> {
        let size = self.size as usize;
        if size > max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size,
                limit: max_frame_size,
            });
        }
        Ok(size)
    }
}

/// An inbound frame whose header has been parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self { opcode, payload }
    }

    /// Attempts to split one complete frame off the front of `bytes`.
    ///
    /// Returns `Ok(None)` when more bytes are needed, otherwise the frame and
    /// the number of bytes it occupied.
    pub fn split(bytes: &[u8], max_frame_size: usize) -> ProtocolResult<Option<(Frame, usize)>> {
        let Some(header_bytes) = bytes.get(..HEADER_SIZE) else {
            return Ok(None);
        };
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(header_bytes);
        let header = FrameHeader::decode(&raw);
        let len = header.payload_len(max_frame_size)?;

        let Some(payload) = bytes.get(HEADER_SIZE..HEADER_SIZE + len) else {
            return Ok(None);
        };
        Ok(Some((
            Frame::new(header.opcode, payload.to_vec()),
            HEADER_SIZE + len,
        )))
    }
}

/// A fully encoded outbound frame, header included, tagged with the
/// connection type it must travel on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub opcode: Opcode,
    pub connection: ConnectionType,
    pub bytes: Vec<u8>,
}

impl EncodedFrame {
    pub fn new(opcode: Opcode, connection: ConnectionType, payload: &[u8]) -> ProtocolResult<Self> {
        let size = u32::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
            size: payload.len(),
            limit: u32::MAX as usize,
        })?;
        let header = FrameHeader { size, opcode };
        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(&header.encode());
        bytes.extend_from_slice(payload);
        Ok(Self {
            opcode,
            connection,
            bytes,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_SIZE..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::smsg;

    #[test]
    fn header_layout_is_little_endian() {
        let header = FrameHeader {
            size: 0x0102,
            opcode: Opcode(0x1033),
        };
        assert_eq!(header.encode(), [0x02, 0x01, 0, 0, 0x33, 0x10, 0, 0]);
        assert_eq!(FrameHeader::decode(&header.encode()), header);
    }

    #[test]
    fn split_waits_for_complete_frame() {
        let frame = EncodedFrame::new(smsg::PONG, ConnectionType::Realm, &[1, 2, 3]).unwrap();
        assert_eq!(Frame::split(&frame.bytes[..5], 1024).unwrap(), None);
        assert_eq!(Frame::split(&frame.bytes[..10], 1024).unwrap(), None);

        let (parsed, used) = Frame::split(&frame.bytes, 1024).unwrap().unwrap();
        assert_eq!(used, 11);
        assert_eq!(parsed.opcode, smsg::PONG);
        assert_eq!(parsed.payload, vec![1, 2, 3]);
    }

    #[test]
    fn oversized_header_is_rejected_before_payload_arrives() {
        let header = FrameHeader {
            size: 4096,
            opcode: smsg::PONG,
        };
        let err = Frame::split(&header.encode(), 1024).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::FrameTooLarge {
                size: 4096,
                limit: 1024
            }
        );
        assert!(err.is_fatal());
    }
}
