//! Encounter frame packets.

use crate::buffer::ByteBuffer;
use crate::error::ProtocolResult;
use crate::opcodes::{smsg, ConnectionType, Opcode};
use crate::packet::ServerPacket;

/// Wire form of a boss encounter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncounterState {
    pub boss_id: u32,
    /// 0 not started, 1 in progress, 2 fail, 3 done.
    pub state: u8,
}

impl ServerPacket for EncounterState {
    const OPCODE: Opcode = smsg::ENCOUNTER_STATE;
    const CONNECTION: ConnectionType = ConnectionType::Instance;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_u32(self.boss_id)?;
        buffer.write_u8(self.state)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            boss_id: buffer.read_u32()?,
            state: buffer.read_u8()?,
        })
    }
}

/// Adds a unit to the client's encounter frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncounterEngageUnit {
    pub unit: u64,
    pub priority: u8,
}

impl ServerPacket for EncounterEngageUnit {
    const OPCODE: Opcode = smsg::ENCOUNTER_ENGAGE_UNIT;
    const CONNECTION: ConnectionType = ConnectionType::Instance;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_packed_guid(self.unit)?;
        buffer.write_u8(self.priority)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            unit: buffer.read_packed_guid()?,
            priority: buffer.read_u8()?,
        })
    }
}
