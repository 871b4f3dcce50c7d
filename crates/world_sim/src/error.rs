//! Error types for map simulation.

use crate::encounter::EncounterState;
use crate::types::ObjectGuid;

/// Errors raised by map operations requested from outside the tick, usually
/// by packet handlers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("object {0} is not on this map")]
    UnknownObject(ObjectGuid),

    #[error("object {0} is already on this map")]
    DuplicateObject(ObjectGuid),

    #[error("object {0} is not a unit")]
    NotAUnit(ObjectGuid),

    #[error("unit {0} is dead")]
    Dead(ObjectGuid),

    #[error("no creature template with entry {0}")]
    UnknownTemplate(u32),

    #[error("{attacker} cannot attack {victim}: {reason}")]
    InvalidTarget {
        attacker: ObjectGuid,
        victim: ObjectGuid,
        reason: &'static str,
    },

    #[error("no pending duel from {initiator} to {target}")]
    NoPendingDuel {
        initiator: ObjectGuid,
        target: ObjectGuid,
    },

    #[error("position is not finite")]
    InvalidPosition,

    #[error(transparent)]
    Encounter(#[from] EncounterError),
}

/// Rejected encounter state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EncounterError {
    #[error("boss {boss_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        boss_id: u32,
        from: EncounterState,
        to: EncounterState,
    },
}

/// Script registration failures at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("script '{0}' is already registered")]
    Duplicate(String),
}
