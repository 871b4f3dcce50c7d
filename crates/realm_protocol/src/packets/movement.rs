//! Movement packets and the versioned movement flag block.

use crate::buffer::ByteBuffer;
use crate::error::ProtocolResult;
use crate::opcodes::{cmsg, smsg, ConnectionType, Opcode};
use crate::packet::{ClientPacket, ServerPacket};

/// Movement flags in either of the two layouts clients have used.
///
/// The variant is carried on the wire as a 1-bit discriminant in front of the
/// flag bits, so old and new layouts can be mixed in one stream without the
/// reader guessing from the build number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementFlags {
    /// Single 16-bit flag word.
    Legacy(u16),
    /// 30-bit primary word plus an 18-bit secondary word.
    Extended { flags: u32, flags2: u32 },
}

impl MovementFlags {
    pub const EXTENDED_FLAGS_BITS: u32 = 30;
    pub const EXTENDED_FLAGS2_BITS: u32 = 18;

    pub const FORWARD: u32 = 0x0000_0001;
    pub const BACKWARD: u32 = 0x0000_0002;
    pub const FALLING: u32 = 0x0000_0800;

    /// Primary flag word regardless of layout.
    pub fn primary(&self) -> u32 {
        match *self {
            MovementFlags::Legacy(flags) => u32::from(flags),
            MovementFlags::Extended { flags, .. } => flags,
        }
    }

    pub fn is_moving(&self) -> bool {
        self.primary() & (Self::FORWARD | Self::BACKWARD) != 0
    }

    /// Writes the discriminant and flag bits. The caller flushes.
    pub fn write_bits(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        match *self {
            MovementFlags::Legacy(flags) => {
                buffer.write_bit(false);
                buffer.write_bits(u64::from(flags), 16)
            }
            MovementFlags::Extended { flags, flags2 } => {
                buffer.write_bit(true);
                buffer.write_bits(u64::from(flags), Self::EXTENDED_FLAGS_BITS)?;
                buffer.write_bits(u64::from(flags2), Self::EXTENDED_FLAGS2_BITS)
            }
        }
    }

    pub fn read_bits(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        if buffer.has_bit()? {
            Ok(MovementFlags::Extended {
                flags: buffer.read_bits(Self::EXTENDED_FLAGS_BITS)?,
                flags2: buffer.read_bits(Self::EXTENDED_FLAGS2_BITS)?,
            })
        } else {
            Ok(MovementFlags::Legacy(buffer.read_bits(16)?))
        }
    }
}

impl Default for MovementFlags {
    fn default() -> Self {
        MovementFlags::Legacy(0)
    }
}

/// Shared movement block used by client and server movement packets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MovementInfo {
    pub guid: u64,
    pub flags: MovementFlags,
    pub time: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub orientation: f32,
}

impl MovementInfo {
    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        self.flags.write_bits(buffer)?;
        buffer.flush_bits();
        buffer.write_packed_guid(self.guid)?;
        buffer.write_u32(self.time)?;
        buffer.write_f32(self.x)?;
        buffer.write_f32(self.y)?;
        buffer.write_f32(self.z)?;
        buffer.write_f32(self.orientation)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        let flags = MovementFlags::read_bits(buffer)?;
        buffer.reset_bits();
        Ok(Self {
            flags,
            guid: buffer.read_packed_guid()?,
            time: buffer.read_u32()?,
            x: buffer.read_f32()?,
            y: buffer.read_f32()?,
            z: buffer.read_f32()?,
            orientation: buffer.read_f32()?,
        })
    }
}

/// Movement reported by the controlling client.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveUpdate {
    pub info: MovementInfo,
}

impl ClientPacket for MoveUpdate {
    const OPCODE: Opcode = cmsg::MOVE_UPDATE;

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            info: MovementInfo::read(buffer)?,
        })
    }

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        self.info.write(buffer)
    }
}

/// Movement of another object relayed to observers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveNotify {
    pub info: MovementInfo,
}

impl ServerPacket for MoveNotify {
    const OPCODE: Opcode = smsg::MOVE_UPDATE;
    const CONNECTION: ConnectionType = ConnectionType::Instance;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        self.info.write(buffer)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            info: MovementInfo::read(buffer)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{decode_payload, encode_request};

    fn sample(flags: MovementFlags) -> MoveUpdate {
        MoveUpdate {
            info: MovementInfo {
                guid: 0x0700_0000_0000_0011,
                flags,
                time: 1000,
                x: -8949.95,
                y: -132.49,
                z: 83.53,
                orientation: 0.5,
            },
        }
    }

    #[test]
    fn both_flag_layouts_survive_the_wire() {
        for flags in [
            MovementFlags::Legacy(0x8001),
            MovementFlags::Extended {
                flags: 0x2000_0801,
                flags2: 0x3_0001,
            },
        ] {
            let packet = sample(flags);
            let frame = encode_request(&packet, ConnectionType::Instance).unwrap();
            assert_eq!(decode_payload::<MoveUpdate>(frame.payload()).unwrap(), packet);
        }
    }

    #[test]
    fn legacy_block_is_three_bytes_of_bits() {
        let packet = sample(MovementFlags::Legacy(0xFFFF));
        let frame = encode_request(&packet, ConnectionType::Instance).unwrap();
        // 1 discriminant bit + 16 flag bits pad to 3 bytes.
        assert_eq!(frame.payload()[..3], [0x7F, 0xFF, 0x80]);
    }

    #[test]
    fn moving_checks_primary_word() {
        assert!(MovementFlags::Legacy(MovementFlags::FORWARD as u16).is_moving());
        assert!(!MovementFlags::Extended {
            flags: MovementFlags::FALLING,
            flags2: 0
        }
        .is_moving());
    }
}
