//! Duel negotiation packets.

use crate::buffer::ByteBuffer;
use crate::error::ProtocolResult;
use crate::opcodes::{cmsg, smsg, ConnectionType, Opcode};
use crate::packet::{ClientPacket, ServerPacket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuelProposed {
    pub target: u64,
}

impl ClientPacket for DuelProposed {
    const OPCODE: Opcode = cmsg::DUEL_PROPOSED;

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            target: buffer.read_packed_guid()?,
        })
    }

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_packed_guid(self.target)
    }
}

/// Layout: `accepted:1`, flush, `initiator:packed guid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuelResponse {
    pub initiator: u64,
    pub accepted: bool,
}

impl ClientPacket for DuelResponse {
    const OPCODE: Opcode = cmsg::DUEL_RESPONSE;

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        let accepted = buffer.has_bit()?;
        buffer.reset_bits();
        Ok(Self {
            initiator: buffer.read_packed_guid()?,
            accepted,
        })
    }

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_bit(self.accepted);
        buffer.flush_bits();
        buffer.write_packed_guid(self.initiator)
    }
}

/// Sent to both participants when a duel is proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuelRequested {
    pub initiator: u64,
    pub target: u64,
}

impl ServerPacket for DuelRequested {
    const OPCODE: Opcode = smsg::DUEL_REQUESTED;
    const CONNECTION: ConnectionType = ConnectionType::Instance;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_packed_guid(self.initiator)?;
        buffer.write_packed_guid(self.target)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            initiator: buffer.read_packed_guid()?,
            target: buffer.read_packed_guid()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DuelOutcome {
    Started = 0,
    Declined = 1,
    Expired = 2,
    Cancelled = 3,
    /// `initiator` of the completion packet is the winner.
    Won = 4,
}

impl From<u8> for DuelOutcome {
    fn from(value: u8) -> Self {
        match value {
            0 => DuelOutcome::Started,
            1 => DuelOutcome::Declined,
            2 => DuelOutcome::Expired,
            4 => DuelOutcome::Won,
            _ => DuelOutcome::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuelComplete {
    pub initiator: u64,
    pub target: u64,
    pub outcome: DuelOutcome,
}

impl ServerPacket for DuelComplete {
    const OPCODE: Opcode = smsg::DUEL_COMPLETE;
    const CONNECTION: ConnectionType = ConnectionType::Instance;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_u8(self.outcome as u8)?;
        buffer.write_packed_guid(self.initiator)?;
        buffer.write_packed_guid(self.target)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            outcome: DuelOutcome::from(buffer.read_u8()?),
            initiator: buffer.read_packed_guid()?,
            target: buffer.read_packed_guid()?,
        })
    }
}
