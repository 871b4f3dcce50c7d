//! Boss encounter states and the instance script surface.
//!
//! ```text
//!   NotStarted ──engage──▶ InProgress ──boss dies──▶ Done
//!        ▲                     │
//!        └──respawn── Fail ◀───┘ wipe / evade
//! ```
//!
//! `Done` is terminal until [`EncounterTracker::reset_encounter`] is called.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tracing::warn;

use crate::error::EncounterError;
use crate::types::ObjectGuid;

/// Shortest delay between a failed attempt and the boss respawning.
pub const MIN_RESPAWN_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EncounterState {
    #[default]
    NotStarted,
    InProgress,
    Fail,
    Done,
}

impl EncounterState {
    /// Wire value used by the encounter state packet.
    pub fn as_u8(self) -> u8 {
        match self {
            EncounterState::NotStarted => 0,
            EncounterState::InProgress => 1,
            EncounterState::Fail => 2,
            EncounterState::Done => 3,
        }
    }

    fn allows(self, to: EncounterState) -> bool {
        matches!(
            (self, to),
            (EncounterState::NotStarted, EncounterState::InProgress)
                | (EncounterState::InProgress, EncounterState::Done)
                | (EncounterState::InProgress, EncounterState::Fail)
                | (EncounterState::Fail, EncounterState::NotStarted)
        )
    }
}

/// Boss-specific state attached to a creature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BossBehavior {
    pub boss_id: u32,
    /// Creatures summoned during the current attempt.
    pub summons: BTreeSet<ObjectGuid>,
    /// Requested delay before respawning after a failed attempt.
    pub respawn_delay: Duration,
}

impl BossBehavior {
    pub fn new(boss_id: u32, respawn_delay: Duration) -> Self {
        Self {
            boss_id,
            summons: BTreeSet::new(),
            respawn_delay,
        }
    }
}

/// Encounter state of every boss in one instance.
#[derive(Debug, Clone, Default)]
pub struct EncounterTracker {
    states: BTreeMap<u32, EncounterState>,
}

impl EncounterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, boss_id: u32) -> EncounterState {
        self.states.get(&boss_id).copied().unwrap_or_default()
    }

    /// Applies a transition and returns the previous state.
    pub fn set_state(&mut self, boss_id: u32, to: EncounterState) -> Result<EncounterState, EncounterError> {
        let from = self.state(boss_id);
        if !from.allows(to) {
            return Err(EncounterError::InvalidTransition { boss_id, from, to });
        }
        self.states.insert(boss_id, to);
        Ok(from)
    }

    /// Forces the encounter back to `NotStarted` from any state, including
    /// `Done`. Returns the previous state.
    pub fn reset_encounter(&mut self, boss_id: u32) -> EncounterState {
        self.states
            .insert(boss_id, EncounterState::NotStarted)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, EncounterState)> + '_ {
        self.states.iter().map(|(id, state)| (*id, *state))
    }
}

/// Clamps a requested respawn delay to [`MIN_RESPAWN_DELAY`].
pub fn respawn_delay(boss_id: u32, requested: Duration) -> Duration {
    if requested < MIN_RESPAWN_DELAY {
        warn!(
            boss_id,
            requested_ms = requested.as_millis() as u64,
            "Respawn delay below minimum, using {}s",
            MIN_RESPAWN_DELAY.as_secs()
        );
        return MIN_RESPAWN_DELAY;
    }
    requested
}

/// Per-instance script hooks.
///
/// Hooks observe transitions; they never mutate the map directly.
pub trait InstanceScript: Send {
    fn name(&self) -> &'static str;

    /// Vetoes an engage. A boss whose engage is refused evades.
    fn check_engage(&self, _boss_id: u32, _who: ObjectGuid) -> bool {
        true
    }

    fn on_engage(&mut self, _boss_id: u32, _boss: ObjectGuid) {}

    fn on_unit_death(&mut self, _unit: ObjectGuid, _entry: Option<u32>) {}

    fn on_encounter_state_change(&mut self, _boss_id: u32, _old: EncounterState, _new: EncounterState) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_and_terminal_done() {
        let mut tracker = EncounterTracker::new();
        assert_eq!(tracker.state(1), EncounterState::NotStarted);
        assert_eq!(tracker.set_state(1, EncounterState::InProgress), Ok(EncounterState::NotStarted));
        assert_eq!(tracker.set_state(1, EncounterState::Done), Ok(EncounterState::InProgress));

        let err = tracker.set_state(1, EncounterState::InProgress).unwrap_err();
        assert_eq!(
            err,
            EncounterError::InvalidTransition {
                boss_id: 1,
                from: EncounterState::Done,
                to: EncounterState::InProgress
            }
        );
        assert_eq!(tracker.reset_encounter(1), EncounterState::Done);
        assert_eq!(tracker.state(1), EncounterState::NotStarted);
    }

    #[test]
    fn fail_returns_to_not_started() {
        let mut tracker = EncounterTracker::new();
        tracker.set_state(2, EncounterState::InProgress).unwrap();
        tracker.set_state(2, EncounterState::Fail).unwrap();
        assert!(tracker.set_state(2, EncounterState::InProgress).is_err());
        tracker.set_state(2, EncounterState::NotStarted).unwrap();
        assert!(tracker.set_state(2, EncounterState::Done).is_err());
    }

    #[test]
    fn respawn_delay_has_a_floor() {
        assert_eq!(respawn_delay(1, Duration::ZERO), MIN_RESPAWN_DELAY);
        assert_eq!(respawn_delay(1, Duration::from_millis(1999)), MIN_RESPAWN_DELAY);
        assert_eq!(respawn_delay(1, Duration::from_secs(30)), Duration::from_secs(30));
    }
}
