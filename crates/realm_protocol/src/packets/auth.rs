//! Session authentication and the instance connection handshake.

use crate::buffer::ByteBuffer;
use crate::error::ProtocolResult;
use crate::opcodes::{cmsg, smsg, ConnectionType, Opcode};
use crate::packet::{ClientPacket, ServerPacket};

/// Longest account name the bit-packed length field can carry.
pub const MAX_ACCOUNT_NAME_LEN: usize = 127;

/// Longest message of the day the bit-packed length field can carry.
pub const MAX_MOTD_LEN: usize = 1023;

/// First packet on a realm connection.
///
/// Layout: `name_len:7 bits`, flush, `build:u32`, `account_id:u32`,
/// `locale:4 bytes`, `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub build: u32,
    pub account_id: u32,
    pub locale: String,
    pub account_name: String,
}

impl ClientPacket for AuthSession {
    const OPCODE: Opcode = cmsg::AUTH_SESSION;

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        let name_len: u8 = buffer.read_bits(7)?;
        buffer.reset_bits();
        Ok(Self {
            build: buffer.read_u32()?,
            account_id: buffer.read_u32()?,
            locale: buffer.read_string(4)?,
            account_name: buffer.read_string(name_len as usize)?,
        })
    }

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        let name = truncate_utf8(&self.account_name, MAX_ACCOUNT_NAME_LEN);
        buffer.write_bits(name.len() as u64, 7)?;
        buffer.flush_bits();
        buffer.write_u32(self.build)?;
        buffer.write_u32(self.account_id)?;
        let mut locale = [b' '; 4];
        for (slot, byte) in locale.iter_mut().zip(self.locale.bytes()) {
            *slot = byte;
        }
        buffer.write_bytes(&locale)?;
        buffer.write_string(name)
    }
}

/// Result code carried by [`AuthResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthResult {
    Ok = 0,
    Failed = 1,
    Banned = 2,
    ServerFull = 3,
    VersionMismatch = 4,
    Queued = 5,
}

impl From<u8> for AuthResult {
    fn from(value: u8) -> Self {
        match value {
            0 => AuthResult::Ok,
            1 => AuthResult::Failed,
            2 => AuthResult::Banned,
            3 => AuthResult::ServerFull,
            4 => AuthResult::VersionMismatch,
            5 => AuthResult::Queued,
            // Unknown result codes are treated as a generic failure.
            _ => AuthResult::Failed,
        }
    }
}

/// Layout: `has_queue:1`, `motd_len:10`, flush, `result:u8`,
/// `[queue_position:u32]`, `motd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub result: AuthResult,
    pub queue_position: Option<u32>,
    pub motd: String,
}

impl ServerPacket for AuthResponse {
    const OPCODE: Opcode = smsg::AUTH_RESPONSE;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        let motd = truncate_utf8(&self.motd, MAX_MOTD_LEN);
        buffer.write_bit(self.queue_position.is_some());
        buffer.write_bits(motd.len() as u64, 10)?;
        buffer.flush_bits();
        buffer.write_u8(self.result as u8)?;
        if let Some(position) = self.queue_position {
            buffer.write_u32(position)?;
        }
        buffer.write_string(motd)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        let has_queue = buffer.has_bit()?;
        let motd_len: u16 = buffer.read_bits(10)?;
        buffer.reset_bits();
        let result = AuthResult::from(buffer.read_u8()?);
        let queue_position = if has_queue {
            Some(buffer.read_u32()?)
        } else {
            None
        };
        Ok(Self {
            result,
            queue_position,
            motd: buffer.read_string(motd_len as usize)?,
        })
    }
}

/// Tells the client to open an instance connection and present `key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectTo {
    pub key: u64,
    pub serial: u32,
    pub port: u16,
}

impl ServerPacket for ConnectTo {
    const OPCODE: Opcode = smsg::CONNECT_TO;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_u64(self.key)?;
        buffer.write_u32(self.serial)?;
        buffer.write_u16(self.port)
    }

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            key: buffer.read_u64()?,
            serial: buffer.read_u32()?,
            port: buffer.read_u16()?,
        })
    }
}

/// First packet on an instance connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContinuedSession {
    pub key: u64,
    pub serial: u32,
}

impl ClientPacket for AuthContinuedSession {
    const OPCODE: Opcode = cmsg::AUTH_CONTINUED_SESSION;

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self {
            key: buffer.read_u64()?,
            serial: buffer.read_u32()?,
        })
    }

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        buffer.write_u64(self.key)?;
        buffer.write_u32(self.serial)
    }
}

/// Acknowledges a continued session; queued instance traffic follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResumeComms;

impl ServerPacket for ResumeComms {
    const OPCODE: Opcode = smsg::RESUME_COMMS;
    const CONNECTION: ConnectionType = ConnectionType::Instance;

    fn write(&self, _buffer: &mut ByteBuffer) -> ProtocolResult<()> {
        Ok(())
    }

    fn read(_buffer: &mut ByteBuffer) -> ProtocolResult<Self> {
        Ok(Self)
    }
}

fn truncate_utf8(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{decode_payload, decode_response, encode_packet, encode_request};

    #[test]
    fn auth_session_packs_name_length_into_bits() {
        let packet = AuthSession {
            build: 12340,
            account_id: 9,
            locale: "deDE".into(),
            account_name: "arthas".into(),
        };
        let frame = encode_request(&packet, ConnectionType::Realm).unwrap();
        assert_eq!(frame.payload()[0], 6 << 1);
        assert_eq!(decode_payload::<AuthSession>(frame.payload()).unwrap(), packet);
    }

    #[test]
    fn auth_response_optional_queue_position() {
        let queued = AuthResponse {
            result: AuthResult::Queued,
            queue_position: Some(17),
            motd: "Welcome".into(),
        };
        let frame = encode_packet(&queued).unwrap();
        assert_eq!(decode_response::<AuthResponse>(frame.payload()).unwrap(), queued);

        let ok = AuthResponse {
            result: AuthResult::Ok,
            queue_position: None,
            motd: String::new(),
        };
        let frame = encode_packet(&ok).unwrap();
        assert_eq!(frame.payload().len(), 3);
        assert_eq!(decode_response::<AuthResponse>(frame.payload()).unwrap(), ok);
    }

    #[test]
    fn overlong_names_are_cut_on_char_boundary() {
        let name = "é".repeat(100);
        let cut = truncate_utf8(&name, MAX_ACCOUNT_NAME_LEN);
        assert!(cut.len() <= MAX_ACCOUNT_NAME_LEN);
        assert_eq!(cut.len() % 2, 0);
    }
}
