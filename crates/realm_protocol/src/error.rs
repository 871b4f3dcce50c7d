//! Error types for the wire protocol layer.
//!
//! Decode failures are split into two classes: failures that only cost the
//! current frame (unknown or misrouted opcodes) and failures that leave the
//! byte stream in an unknown state and therefore fault the connection.

use crate::opcodes::{ConnectionType, Opcode};

/// Result alias used by every buffer and packet operation.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// No decode strategy is registered for this opcode.
    #[error("unknown opcode {opcode} on {connection} connection")]
    UnknownOpcode {
        opcode: Opcode,
        connection: ConnectionType,
    },

    /// The opcode is known but is only accepted on the other connection type.
    #[error("opcode {opcode} received on {received} connection, expected {expected}")]
    WrongConnection {
        opcode: Opcode,
        received: ConnectionType,
        expected: ConnectionType,
    },

    /// A read went past the end of the payload.
    #[error("payload truncated: needed {needed} byte(s) at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Misuse of the bit cursor or an impossible bit-field request.
    #[error("malformed bit stream: {0}")]
    MalformedBitStream(BitStreamFault),

    /// A string field did not contain valid UTF-8.
    #[error("invalid UTF-8 in string field of {len} byte(s)")]
    InvalidString { len: usize },

    /// The frame header announced a payload larger than the configured limit.
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },
}

impl ProtocolError {
    /// Whether the connection that produced this error must be closed.
    ///
    /// Unknown and misrouted opcodes only drop the frame so newer clients can
    /// send opcodes this server does not implement yet.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ProtocolError::UnknownOpcode { .. } | ProtocolError::WrongConnection { .. }
        )
    }
}

/// The specific way a bit-packed run was misused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BitStreamFault {
    /// A byte-aligned read or write happened with bits still pending.
    #[error("byte-aligned access with {pending} bit(s) pending in the current byte")]
    UnflushedBits { pending: u8 },

    /// More bits were requested than the target type can hold.
    #[error("requested {requested} bits into a {width}-bit value")]
    WidthOverflow { requested: u32, width: u32 },
}

impl From<BitStreamFault> for ProtocolError {
    fn from(fault: BitStreamFault) -> Self {
        ProtocolError::MalformedBitStream(fault)
    }
}

/// Configuration errors raised while building an opcode table at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Two strategies were registered for the same opcode and direction.
    #[error("opcode {opcode} already registered for {direction} as {existing}")]
    Duplicate {
        opcode: Opcode,
        direction: crate::opcodes::Direction,
        existing: &'static str,
    },
}

/// Failure raised by application-level handler logic for a single packet.
///
/// Faults are logged and the packet is dropped; they never tear down the
/// session or the simulation thread.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerFault(pub String);

impl HandlerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
