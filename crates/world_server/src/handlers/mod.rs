//! Opcode handlers for in-world packets.
//!
//! Every client opcode that is not handled on the socket itself is
//! registered here against the [`World`] context. Handlers run on the world
//! runner; any [`HandlerFault`] they return is logged and the packet is
//! dropped.
//!
//! ## Handler Groups
//!
//! - [`character`] - Entering and leaving the world
//! - [`movement`] - Client-reported movement
//! - [`combat`] - Melee and feign death
//! - [`duel`] - Duel requests and answers

pub mod character;
pub mod combat;
pub mod duel;
pub mod movement;

use crate::world::World;
use realm_protocol::packets::{
    AttackStart, AttackStop, AttackerStateUpdate, AuthResponse, ConnectTo, DestroyObject, DuelComplete,
    DuelRequested, EncounterEngageUnit, EncounterState, HighestThreatUpdate, LoginVerifyWorld, LogoutComplete,
    MoveNotify, Pong, ResumeComms, ThreatClear, ThreatRemove, ThreatUpdate,
};
use realm_protocol::{HandlerFault, OpcodeTable, RegistryError};
use world_sim::{MapError, SessionId};

/// Opcode table used by the server: handlers mutate the [`World`] on
/// behalf of a session.
pub type WorldTable = OpcodeTable<World, SessionId>;

/// Builds the table with every client handler and server packet.
///
/// # Returns
///
/// `RegistryError::Duplicate` if two registrations collide, which is a
/// startup configuration error.
pub fn build_opcode_table() -> Result<WorldTable, RegistryError> {
    let mut table = WorldTable::new();

    character::register(&mut table)?;
    movement::register(&mut table)?;
    combat::register(&mut table)?;
    duel::register(&mut table)?;

    table.register_server::<Pong>()?;
    table.register_server::<AuthResponse>()?;
    table.register_server::<ConnectTo>()?;
    table.register_server::<ResumeComms>()?;
    table.register_server::<LoginVerifyWorld>()?;
    table.register_server::<LogoutComplete>()?;
    table.register_server::<MoveNotify>()?;
    table.register_server::<DestroyObject>()?;
    table.register_server::<AttackStart>()?;
    table.register_server::<AttackStop>()?;
    table.register_server::<AttackerStateUpdate>()?;
    table.register_server::<ThreatUpdate>()?;
    table.register_server::<HighestThreatUpdate>()?;
    table.register_server::<ThreatClear>()?;
    table.register_server::<ThreatRemove>()?;
    table.register_server::<EncounterState>()?;
    table.register_server::<EncounterEngageUnit>()?;
    table.register_server::<DuelRequested>()?;
    table.register_server::<DuelComplete>()?;

    Ok(table)
}

pub(crate) fn map_fault(error: MapError) -> HandlerFault {
    HandlerFault::new(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_protocol::{cmsg, smsg, ConnectionType, Direction};

    #[test]
    fn table_covers_world_opcodes() {
        let table = build_opcode_table().unwrap();
        for opcode in [
            cmsg::PLAYER_LOGIN,
            cmsg::LOGOUT_REQUEST,
            cmsg::MOVE_UPDATE,
            cmsg::ATTACK_SWING,
            cmsg::ATTACK_STOP,
            cmsg::FEIGN_DEATH,
            cmsg::DUEL_PROPOSED,
            cmsg::DUEL_RESPONSE,
        ] {
            assert!(table.is_registered(opcode, Direction::ClientToServer), "{opcode}");
        }
        // Socket-level opcodes never reach the table.
        assert!(!table.is_registered(cmsg::PING, Direction::ClientToServer));
        assert!(!table.is_registered(cmsg::AUTH_SESSION, Direction::ClientToServer));

        assert_eq!(table.server_connection(smsg::CONNECT_TO), Some(ConnectionType::Realm));
        assert_eq!(table.server_connection(smsg::RESUME_COMMS), Some(ConnectionType::Instance));
        assert_eq!(table.server_opcodes(), 19);
    }
}
