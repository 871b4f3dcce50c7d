//! Packet traits and the single-packet encode/decode helpers.
//!
//! Both traits carry a reader and a writer. The server only ever reads client
//! packets and writes server packets; the other half is what the load-test
//! client and the test suites use to speak the protocol from the other end.

use tracing::warn;

use crate::buffer::ByteBuffer;
use crate::error::ProtocolResult;
use crate::frame::EncodedFrame;
use crate::opcodes::{ConnectionType, Opcode};

/// A packet sent by the client.
pub trait ClientPacket: Sized + Send + 'static {
    const OPCODE: Opcode;

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self>;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()>;
}

/// A packet sent by the server.
pub trait ServerPacket: Sized {
    const OPCODE: Opcode;

    /// Connection the packet is routed to. Traffic before entering a map uses
    /// the realm connection; in-world packets override this.
    const CONNECTION: ConnectionType = ConnectionType::Realm;

    fn write(&self, buffer: &mut ByteBuffer) -> ProtocolResult<()>;

    fn read(buffer: &mut ByteBuffer) -> ProtocolResult<Self>;
}

fn finish(opcode: Opcode, connection: ConnectionType, mut payload: ByteBuffer) -> ProtocolResult<EncodedFrame> {
    // A trailing bit-packed run is flushed so packets ending in bit fields
    // need not flush explicitly.
    payload.flush_bits();
    EncodedFrame::new(opcode, connection, payload.as_slice())
}

/// Serializes a server packet into a complete frame.
pub fn encode_packet<P: ServerPacket>(packet: &P) -> ProtocolResult<EncodedFrame> {
    let mut payload = ByteBuffer::new();
    packet.write(&mut payload)?;
    finish(P::OPCODE, P::CONNECTION, payload)
}

/// Serializes a client packet into a complete frame for `connection`.
pub fn encode_request<P: ClientPacket>(
    packet: &P,
    connection: ConnectionType,
) -> ProtocolResult<EncodedFrame> {
    let mut payload = ByteBuffer::new();
    packet.write(&mut payload)?;
    finish(P::OPCODE, connection, payload)
}

/// Decodes a client payload into `P`. Unread trailing bytes are tolerated.
pub fn decode_payload<P: ClientPacket>(payload: &[u8]) -> ProtocolResult<P> {
    let mut buffer = ByteBuffer::from(payload);
    let packet = P::read(&mut buffer)?;
    warn_trailing(P::OPCODE, &buffer);
    Ok(packet)
}

/// Decodes a server payload into `P`. Unread trailing bytes are tolerated.
pub fn decode_response<P: ServerPacket>(payload: &[u8]) -> ProtocolResult<P> {
    let mut buffer = ByteBuffer::from(payload);
    let packet = P::read(&mut buffer)?;
    warn_trailing(P::OPCODE, &buffer);
    Ok(packet)
}

pub(crate) fn warn_trailing(opcode: Opcode, buffer: &ByteBuffer) {
    if buffer.remaining() > 0 {
        warn!(
            opcode = %opcode,
            trailing = buffer.remaining(),
            size = buffer.len(),
            "Packet decoded with unread trailing bytes"
        );
    }
}
