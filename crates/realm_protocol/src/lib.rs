//! # Realm Protocol
//!
//! Wire layer of the realm world server: a growable byte buffer with a bit
//! cursor, the length-prefixed frame envelope, the opcode numbering, and the
//! opcode table that turns inbound frames into handler jobs.
//!
//! ## Frame format
//!
//! ```text
//! +-----------+-------------+------------------------+
//! | size: u32 | opcode: u32 | payload (size bytes)   |
//! +-----------+-------------+------------------------+
//! ```
//!
//! Both header fields are little-endian. Payloads mix byte-aligned fields and
//! bit-packed runs; a run is always closed by `flush_bits` on the writer and
//! `reset_bits` on the reader before the next byte-aligned field.
//!
//! ## Dispatch
//!
//! Handlers are registered once at startup against an [`OpcodeTable`]. The
//! network task decodes each frame into a [`PacketJob`] which the simulation
//! thread runs against its own context, so packet structs never need to be
//! shared between threads after decoding.

pub mod buffer;
pub mod error;
pub mod frame;
pub mod locale;
pub mod opcodes;
pub mod packet;
pub mod packets;
pub mod table;

pub use buffer::{BitField, ByteBuffer};
pub use error::{BitStreamFault, HandlerFault, ProtocolError, ProtocolResult, RegistryError};
pub use frame::{EncodedFrame, Frame, FrameHeader, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
pub use locale::{Locale, Localized};
pub use opcodes::{cmsg, smsg, ConnectionType, Direction, Opcode};
pub use packet::{decode_payload, decode_response, encode_packet, encode_request, ClientPacket, ServerPacket};
pub use table::{OpcodeTable, PacketJob};
