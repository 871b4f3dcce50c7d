//! Keep-alive traffic plus the login/logout handshake inside a session.

use crate::buffer::ByteBuffer;
use crate::error::ProtocolResult;
use crate::opcodes::{cmsg, smsg, ConnectionType, Opcode};
use crate::packet::{ClientPacket, ServerPacket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub serial: u32,
    pub latency: u32,
}

impl ClientPacket for Ping {
    const OPCODE: Opcode = cmsg::PING;

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            serial: buffer.read_u32()?,
            latency: buffer.read_u32()?,
        })
    }

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_u32(self.serial)?;
        buffer.write_u32(self.latency)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pong {
    pub serial: u32,
}

impl ServerPacket for Pong {
    const OPCODE: Opcode = smsg::PONG;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_u32(self.serial)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            serial: buffer.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeepAlive;

impl ClientPacket for KeepAlive {
    const OPCODE: Opcode = cmsg::KEEP_ALIVE;

    fn read(_buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self)
    }

    fn write(&self, _buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        Ok(())
    }
}

/// Enter the world with the selected character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerLogin {
    pub character: u64,
}

impl ClientPacket for PlayerLogin {
    const OPCODE: Opcode = cmsg::PLAYER_LOGIN;

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            character: buffer.read_packed_guid()?,
        })
    }

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_packed_guid(self.character)
    }
}

/// Sent once the player's avatar has been placed on a map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoginVerifyWorld {
    pub guid: u64,
    pub map_id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub orientation: f32,
}

impl ServerPacket for LoginVerifyWorld {
    const OPCODE: Opcode = smsg::LOGIN_VERIFY_WORLD;
    const CONNECTION: ConnectionType = ConnectionType::Instance;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_packed_guid(self.guid)?;
        buffer.write_u32(self.map_id)?;
        buffer.write_f32(self.x)?;
        buffer.write_f32(self.y)?;
        buffer.write_f32(self.z)?;
        buffer.write_f32(self.orientation)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            guid: buffer.read_packed_guid()?,
            map_id: buffer.read_u32()?,
            x: buffer.read_f32()?,
            y: buffer.read_f32()?,
            z: buffer.read_f32()?,
            orientation: buffer.read_f32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogoutRequest;

impl ClientPacket for LogoutRequest {
    const OPCODE: Opcode = cmsg::LOGOUT_REQUEST;

    fn read(_buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self)
    }

    fn write(&self, _buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogoutComplete;

impl ServerPacket for LogoutComplete {
    const OPCODE: Opcode = smsg::LOGOUT_COMPLETE;

    fn write(&self, _buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        Ok(())
    }

    fn read(_buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self)
    }
}

/// Removes an object from the client's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroyObject {
    pub guid: u64,
    pub on_death: bool,
}

impl ServerPacket for DestroyObject {
    const OPCODE: Opcode = smsg::DESTROY_OBJECT;
    const CONNECTION: ConnectionType = ConnectionType::Instance;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_bit(self.on_death);
        buffer.flush_bits();
        buffer.write_packed_guid(self.guid)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        let on_death = buffer.has_bit()?;
        buffer.reset_bits();
        Ok(Self {
            guid: buffer.read_packed_guid()?,
            on_death,
        })
    }
}
