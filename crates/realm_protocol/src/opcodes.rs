//! Opcode numbering, connection types and directions.
//!
//! Client opcodes live in `0x0000..0x1000` and server opcodes in
//! `0x1000..0x2000` so a bare number is never ambiguous in logs. The numbering
//! is this server's own and makes no attempt to match any retail client build.

use std::fmt;

/// Numeric packet identifier carried in every frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opcode(pub u32);

impl Opcode {
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Human readable name, `"UNKNOWN"` for unassigned numbers.
    pub fn name(self) -> &'static str {
        opcode_name(self)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#06x})", self.name(), self.0)
    }
}

/// Which of a session's sockets a packet travels on.
///
/// `Realm` exists for the whole session; `Instance` only while the player's
/// avatar is inside a simulated map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConnectionType {
    Realm,
    Instance,
}

impl ConnectionType {
    pub const ALL: [ConnectionType; 2] = [ConnectionType::Realm, ConnectionType::Instance];

    pub fn index(self) -> usize {
        match self {
            ConnectionType::Realm => 0,
            ConnectionType::Instance => 1,
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionType::Realm => f.write_str("realm"),
            ConnectionType::Instance => f.write_str("instance"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToServer => f.write_str("client->server"),
            Direction::ServerToClient => f.write_str("server->client"),
        }
    }
}

// ============================================================================
// Client -> Server
// ============================================================================

/// Client to server opcodes.
pub mod cmsg {
    use super::Opcode;

    // --- Socket level (handled on the connection task) ---
    pub const PING: Opcode = Opcode(0x0001);
    pub const KEEP_ALIVE: Opcode = Opcode(0x0002);
    pub const AUTH_SESSION: Opcode = Opcode(0x0003);
    pub const AUTH_CONTINUED_SESSION: Opcode = Opcode(0x0004);

    // --- Session ---
    pub const PLAYER_LOGIN: Opcode = Opcode(0x0010);
    pub const LOGOUT_REQUEST: Opcode = Opcode(0x0011);

    // --- Movement ---
    pub const MOVE_UPDATE: Opcode = Opcode(0x0020);

    // --- Combat ---
    pub const ATTACK_SWING: Opcode = Opcode(0x0030);
    pub const ATTACK_STOP: Opcode = Opcode(0x0031);
    pub const FEIGN_DEATH: Opcode = Opcode(0x0032);

    // --- Duels ---
    pub const DUEL_PROPOSED: Opcode = Opcode(0x0040);
    pub const DUEL_RESPONSE: Opcode = Opcode(0x0041);
}

// ============================================================================
// Server -> Client
// ============================================================================

/// Server to client opcodes.
pub mod smsg {
    use super::Opcode;

    // --- Socket level ---
    pub const PONG: Opcode = Opcode(0x1001);
    pub const AUTH_RESPONSE: Opcode = Opcode(0x1002);
    pub const CONNECT_TO: Opcode = Opcode(0x1003);
    pub const RESUME_COMMS: Opcode = Opcode(0x1004);

    // --- Session ---
    pub const LOGIN_VERIFY_WORLD: Opcode = Opcode(0x1010);
    pub const LOGOUT_COMPLETE: Opcode = Opcode(0x1011);

    // --- Objects and movement ---
    pub const MOVE_UPDATE: Opcode = Opcode(0x1020);
    pub const DESTROY_OBJECT: Opcode = Opcode(0x1021);

    // --- Combat ---
    pub const ATTACK_START: Opcode = Opcode(0x1030);
    pub const ATTACK_STOP: Opcode = Opcode(0x1031);
    pub const ATTACKER_STATE_UPDATE: Opcode = Opcode(0x1032);
    pub const THREAT_UPDATE: Opcode = Opcode(0x1033);
    pub const HIGHEST_THREAT_UPDATE: Opcode = Opcode(0x1034);
    pub const THREAT_CLEAR: Opcode = Opcode(0x1035);
    pub const THREAT_REMOVE: Opcode = Opcode(0x1036);

    // --- Encounters ---
    pub const ENCOUNTER_STATE: Opcode = Opcode(0x1040);
    pub const ENCOUNTER_ENGAGE_UNIT: Opcode = Opcode(0x1041);

    // --- Duels ---
    pub const DUEL_REQUESTED: Opcode = Opcode(0x1050);
    pub const DUEL_COMPLETE: Opcode = Opcode(0x1051);
}

/// Get a human-readable name for an opcode.
pub fn opcode_name(opcode: Opcode) -> &'static str {
    match opcode {
        cmsg::PING => "CMSG_PING",
        cmsg::KEEP_ALIVE => "CMSG_KEEP_ALIVE",
        cmsg::AUTH_SESSION => "CMSG_AUTH_SESSION",
        cmsg::AUTH_CONTINUED_SESSION => "CMSG_AUTH_CONTINUED_SESSION",
        cmsg::PLAYER_LOGIN => "CMSG_PLAYER_LOGIN",
        cmsg::LOGOUT_REQUEST => "CMSG_LOGOUT_REQUEST",
        cmsg::MOVE_UPDATE => "CMSG_MOVE_UPDATE",
        cmsg::ATTACK_SWING => "CMSG_ATTACK_SWING",
        cmsg::ATTACK_STOP => "CMSG_ATTACK_STOP",
        cmsg::FEIGN_DEATH => "CMSG_FEIGN_DEATH",
        cmsg::DUEL_PROPOSED => "CMSG_DUEL_PROPOSED",
        cmsg::DUEL_RESPONSE => "CMSG_DUEL_RESPONSE",
        smsg::PONG => "SMSG_PONG",
        smsg::AUTH_RESPONSE => "SMSG_AUTH_RESPONSE",
        smsg::CONNECT_TO => "SMSG_CONNECT_TO",
        smsg::RESUME_COMMS => "SMSG_RESUME_COMMS",
        smsg::LOGIN_VERIFY_WORLD => "SMSG_LOGIN_VERIFY_WORLD",
        smsg::LOGOUT_COMPLETE => "SMSG_LOGOUT_COMPLETE",
        smsg::MOVE_UPDATE => "SMSG_MOVE_UPDATE",
        smsg::DESTROY_OBJECT => "SMSG_DESTROY_OBJECT",
        smsg::ATTACK_START => "SMSG_ATTACK_START",
        smsg::ATTACK_STOP => "SMSG_ATTACK_STOP",
        smsg::ATTACKER_STATE_UPDATE => "SMSG_ATTACKER_STATE_UPDATE",
        smsg::THREAT_UPDATE => "SMSG_THREAT_UPDATE",
        smsg::HIGHEST_THREAT_UPDATE => "SMSG_HIGHEST_THREAT_UPDATE",
        smsg::THREAT_CLEAR => "SMSG_THREAT_CLEAR",
        smsg::THREAT_REMOVE => "SMSG_THREAT_REMOVE",
        smsg::ENCOUNTER_STATE => "SMSG_ENCOUNTER_STATE",
        smsg::ENCOUNTER_ENGAGE_UNIT => "SMSG_ENCOUNTER_ENGAGE_UNIT",
        smsg::DUEL_REQUESTED => "SMSG_DUEL_REQUESTED",
        smsg::DUEL_COMPLETE => "SMSG_DUEL_COMPLETE",
        _ => "UNKNOWN",
    }
}
