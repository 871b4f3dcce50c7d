//! Melee, attack state and threat list packets.

use crate::buffer::ByteBuffer;
use crate::error::ProtocolResult;
use crate::opcodes::{cmsg, smsg, ConnectionType, Opcode};
use crate::packet::{ClientPacket, ServerPacket};

/// Client asks to start auto-attacking `victim`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackSwing {
    pub victim: u64,
}

impl ClientPacket for AttackSwing {
    const OPCODE: Opcode = cmsg::ATTACK_SWING;

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            victim: buffer.read_u64()?,
        })
    }

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_u64(self.victim)
    }
}

/// Client stops auto-attacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttackStopRequest;

impl ClientPacket for AttackStopRequest {
    const OPCODE: Opcode = cmsg::ATTACK_STOP;

    fn read(_buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self)
    }

    fn write(&self, _buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        Ok(())
    }
}

/// Client feigns death, dropping out of combat on its side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeignDeath;

impl ClientPacket for FeignDeath {
    const OPCODE: Opcode = cmsg::FEIGN_DEATH;

    fn read(_buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self)
    }

    fn write(&self, _buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackStart {
    pub attacker: u64,
    pub victim: u64,
}

impl ServerPacket for AttackStart {
    const OPCODE: Opcode = smsg::ATTACK_START;
    const CONNECTION: ConnectionType = ConnectionType::Instance;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_packed_guid(self.attacker)?;
        buffer.write_packed_guid(self.victim)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            attacker: buffer.read_packed_guid()?,
            victim: buffer.read_packed_guid()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackStop {
    pub attacker: u64,
    pub victim: u64,
    pub now_dead: bool,
}

impl ServerPacket for AttackStop {
    const OPCODE: Opcode = smsg::ATTACK_STOP;
    const CONNECTION: ConnectionType = ConnectionType::Instance;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_bit(self.now_dead);
        buffer.flush_bits();
        buffer.write_packed_guid(self.attacker)?;
        buffer.write_packed_guid(self.victim)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        let now_dead = buffer.has_bit()?;
        buffer.reset_bits();
        Ok(Self {
            attacker: buffer.read_packed_guid()?,
            victim: buffer.read_packed_guid()?,
            now_dead,
        })
    }
}

/// Result of a single melee swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackerStateUpdate {
    pub attacker: u64,
    pub victim: u64,
    pub damage: u32,
    pub overkill: u32,
}

impl ServerPacket for AttackerStateUpdate {
    const OPCODE: Opcode = smsg::ATTACKER_STATE_UPDATE;
    const CONNECTION: ConnectionType = ConnectionType::Instance;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_packed_guid(self.attacker)?;
        buffer.write_packed_guid(self.victim)?;
        buffer.write_u32(self.damage)?;
        buffer.write_u32(self.overkill)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            attacker: buffer.read_packed_guid()?,
            victim: buffer.read_packed_guid()?,
            damage: buffer.read_u32()?,
            overkill: buffer.read_u32()?,
        })
    }
}

/// One row of a threat list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreatEntry {
    pub target: u64,
    pub threat: u32,
}

fn write_threat_list(buffer: &mut ByteBuffer, entries: &[ThreatEntry]) -> ProtocolResult<()> {
    buffer.write_u32(entries.len() as u32)?;
    for entry in entries {
        buffer.write_packed_guid(entry.target)?;
        buffer.write_u32(entry.threat)?;
    }
    Ok(())
}

fn read_threat_list(buffer: &mut ByteBuffer) -> ProtocolResult<Vec<ThreatEntry>> {
    let count = buffer.read_u32()? as usize;
    // Each entry is at least 5 bytes; cap the preallocation by what is left.
    let mut entries = Vec::with_capacity(count.min(buffer.remaining() / 5));
    for _ in 0..count {
        entries.push(ThreatEntry {
            target: buffer.read_packed_guid()?,
            threat: buffer.read_u32()?,
        });
    }
    Ok(entries)
}

/// Full threat list of `unit`, highest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatUpdate {
    pub unit: u64,
    pub entries: Vec<ThreatEntry>,
}

impl ServerPacket for ThreatUpdate {
    const OPCODE: Opcode = smsg::THREAT_UPDATE;
    const CONNECTION: ConnectionType = ConnectionType::Instance;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_packed_guid(self.unit)?;
        write_threat_list(buffer, &self.entries)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            unit: buffer.read_packed_guid()?,
            entries: read_threat_list(buffer)?,
        })
    }
}

/// Sent instead of [`ThreatUpdate`] when the top of the list changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighestThreatUpdate {
    pub unit: u64,
    pub highest: u64,
    pub entries: Vec<ThreatEntry>,
}

impl ServerPacket for HighestThreatUpdate {
    const OPCODE: Opcode = smsg::HIGHEST_THREAT_UPDATE;
    const CONNECTION: ConnectionType = ConnectionType::Instance;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_packed_guid(self.unit)?;
        buffer.write_packed_guid(self.highest)?;
        write_threat_list(buffer, &self.entries)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            unit: buffer.read_packed_guid()?,
            highest: buffer.read_packed_guid()?,
            entries: read_threat_list(buffer)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreatClear {
    pub unit: u64,
}

impl ServerPacket for ThreatClear {
    const OPCODE: Opcode = smsg::THREAT_CLEAR;
    const CONNECTION: ConnectionType = ConnectionType::Instance;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_packed_guid(self.unit)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            unit: buffer.read_packed_guid()?,
        })
    }
}

/// `about` was removed from `unit`'s threat list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreatRemove {
    pub unit: u64,
    pub about: u64,
}

impl ServerPacket for ThreatRemove {
    const OPCODE: Opcode = smsg::THREAT_REMOVE;
    const CONNECTION: ConnectionType = ConnectionType::Instance;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_packed_guid(self.unit)?;
        buffer.write_packed_guid(self.about)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            unit: buffer.read_packed_guid()?,
            about: buffer.read_packed_guid()?,
        })
    }
}
