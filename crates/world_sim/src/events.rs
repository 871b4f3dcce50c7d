//! Outbound notifications produced by a map.
//!
//! The simulation has no knowledge of packets. Each tick it records what
//! happened as [`WorldEvent`]s addressed to the sessions that should hear
//! about it, and the server layer turns them into packets.

use crate::encounter::EncounterState;
use crate::threat::ThreatEntry;
use crate::types::{ObjectGuid, Position, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuelOutcome {
    Started,
    Declined,
    Expired,
    Cancelled,
    /// The duel was fought to the end. `initiator` of the event is the winner.
    Won,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    ObjectMoved {
        guid: ObjectGuid,
        position: Position,
    },
    ObjectDestroyed {
        guid: ObjectGuid,
        on_death: bool,
    },
    AttackStarted {
        attacker: ObjectGuid,
        victim: ObjectGuid,
    },
    AttackStopped {
        attacker: ObjectGuid,
        victim: ObjectGuid,
        now_dead: bool,
    },
    MeleeHit {
        attacker: ObjectGuid,
        victim: ObjectGuid,
        damage: u32,
        overkill: u32,
    },
    ThreatUpdated {
        unit: ObjectGuid,
        highest_changed: bool,
        /// Highest first.
        entries: Vec<ThreatEntry>,
    },
    ThreatCleared {
        unit: ObjectGuid,
    },
    ThreatRemoved {
        unit: ObjectGuid,
        about: ObjectGuid,
    },
    EncounterStateChanged {
        boss_id: u32,
        state: EncounterState,
    },
    EncounterUnitEngaged {
        unit: ObjectGuid,
        priority: u8,
    },
    DuelRequested {
        initiator: ObjectGuid,
        target: ObjectGuid,
    },
    DuelFinished {
        initiator: ObjectGuid,
        target: ObjectGuid,
        outcome: DuelOutcome,
    },
}

/// A [`WorldEvent`] and the sessions it is addressed to.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub recipients: Vec<SessionId>,
    pub event: WorldEvent,
}
