//! Opcode dispatch table.
//!
//! The table maps each client opcode to a decode strategy paired with the
//! handler that consumes the decoded packet, and records which server opcodes
//! exist and which connection they travel on. Registration happens once at
//! startup; a second registration for the same opcode and direction is a
//! configuration error.
//!
//! Decoding happens on the network task. The result is a [`PacketJob`], a
//! boxed closure that owns the decoded packet and a handle to the session and
//! only needs the simulation context to run.

use std::collections::HashMap;
use std::sync::Arc;

use crate::buffer::ByteBuffer;
use crate::error::{HandlerFault, ProtocolError, ProtocolResult, RegistryError};
use crate::frame::Frame;
use crate::opcodes::{ConnectionType, Direction, Opcode};
use crate::packet::{warn_trailing, ClientPacket, ServerPacket};

/// A decoded packet bound to its handler, waiting for the simulation context.
pub type PacketJob<C> = Box<dyn FnOnce(&mut C) -> Result<(), HandlerFault> + Send>;

type DecodeFn<C, S> = Box<dyn Fn(&mut ByteBuffer, S) -> ProtocolResult<PacketJob<C>> + Send + Sync>;

struct ClientEntry<C, S> {
    name: &'static str,
    connection: ConnectionType,
    decode: DecodeFn<C, S>,
}

#[derive(Debug, Clone, Copy)]
struct ServerEntry {
    name: &'static str,
    connection: ConnectionType,
}

/// Registry of decode and encode strategies keyed by opcode.
///
/// `C` is the context handlers mutate (the world) and `S` is the per-session
/// handle captured by each job.
pub struct OpcodeTable<C, S> {
    client: HashMap<Opcode, ClientEntry<C, S>>,
    server: HashMap<Opcode, ServerEntry>,
}

impl<C, S> Default for OpcodeTable<C, S> {
    fn default() -> Self {
        Self {
            client: HashMap::new(),
            server: HashMap::new(),
        }
    }
}

impl<C: 'static, S: Send + 'static> OpcodeTable<C, S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the decode strategy for `P` together with its handler.
    ///
    /// # Arguments
    ///
    /// * `connection` - The only connection type `P` is accepted on
    /// * `handler` - Runs on the simulation thread with the decoded packet
    ///
    /// # Returns
    ///
    /// `RegistryError::Duplicate` if a client strategy for `P::OPCODE` exists.
    pub fn register_handler<P, F>(
        &mut self,
        connection: ConnectionType,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        P: ClientPacket,
        F: Fn(&mut C, &S, P) -> Result<(), HandlerFault> + Send + Sync + 'static,
    {
        if let Some(existing) = self.client.get(&P::OPCODE) {
            return Err(RegistryError::Duplicate {
                opcode: P::OPCODE,
                direction: Direction::ClientToServer,
                existing: existing.name,
            });
        }

        let handler = Arc::new(handler);
        let decode: DecodeFn<C, S> = Box::new(move |buffer, session| {
            let packet = P::read(buffer)?;
            let handler = Arc::clone(&handler);
            let job: PacketJob<C> = Box::new(move |ctx: &mut C| handler(ctx, &session, packet));
            Ok(job)
        });

        self.client.insert(
            P::OPCODE,
            ClientEntry {
                name: std::any::type_name::<P>(),
                connection,
                decode,
            },
        );
        Ok(())
    }

    /// Registers `P` as a known outbound packet.
    pub fn register_server<P: ServerPacket>(&mut self) -> Result<(), RegistryError> {
        if let Some(existing) = self.server.get(&P::OPCODE) {
            return Err(RegistryError::Duplicate {
                opcode: P::OPCODE,
                direction: Direction::ServerToClient,
                existing: existing.name,
            });
        }
        self.server.insert(
            P::OPCODE,
            ServerEntry {
                name: std::any::type_name::<P>(),
                connection: P::CONNECTION,
            },
        );
        Ok(())
    }

    /// Decodes `frame` received on `connection` into a job for `session`.
    ///
    /// Unknown opcodes and opcodes received on the wrong connection type are
    /// reported as non-fatal errors so the caller can drop the frame and keep
    /// the connection.
    pub fn decode(
        &self,
        frame: Frame,
        connection: ConnectionType,
        session: S,
    ) -> ProtocolResult<PacketJob<C>> {
        let entry = self
            .client
            .get(&frame.opcode)
            .ok_or(ProtocolError::UnknownOpcode {
                opcode: frame.opcode,
                connection,
            })?;

        if entry.connection != connection {
            return Err(ProtocolError::WrongConnection {
                opcode: frame.opcode,
                received: connection,
                expected: entry.connection,
            });
        }

        let mut buffer = ByteBuffer::from(frame.payload);
        let job = (entry.decode)(&mut buffer, session)?;
        warn_trailing(frame.opcode, &buffer);
        Ok(job)
    }

    pub fn is_registered(&self, opcode: Opcode, direction: Direction) -> bool {
        match direction {
            Direction::ClientToServer => self.client.contains_key(&opcode),
            Direction::ServerToClient => self.server.contains_key(&opcode),
        }
    }

    /// Connection type a registered server opcode travels on.
    pub fn server_connection(&self, opcode: Opcode) -> Option<ConnectionType> {
        self.server.get(&opcode).map(|entry| entry.connection)
    }

    pub fn client_opcodes(&self) -> usize {
        self.client.len()
    }

    pub fn server_opcodes(&self) -> usize {
        self.server.len()
    }
}
