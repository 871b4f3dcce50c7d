use std::collections::BTreeSet;

use crate::types::ObjectGuid;

/// Per-unit view of the combat graph.
///
/// Holds the set of opponents the unit has a reference with and a cached
/// in-combat flag. The flag is only ever written by the graph, which derives
/// it from the unit's references after every mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombatManager {
    opponents: BTreeSet<ObjectGuid>,
    in_combat: bool,
    pvp_refs: usize,
}

impl CombatManager {
    pub fn opponents(&self) -> impl Iterator<Item = ObjectGuid> + '_ {
        self.opponents.iter().copied()
    }

    pub fn has_opponent(&self, guid: ObjectGuid) -> bool {
        self.opponents.contains(&guid)
    }

    pub fn is_in_combat(&self) -> bool {
        self.in_combat
    }

    pub fn has_pvp_combat(&self) -> bool {
        self.pvp_refs > 0
    }

    pub fn has_pve_combat(&self) -> bool {
        self.opponents.len() > self.pvp_refs
    }

    pub fn reference_count(&self) -> usize {
        self.opponents.len()
    }

    pub(crate) fn add(&mut self, other: ObjectGuid, is_pvp: bool) {
        if self.opponents.insert(other) && is_pvp {
            self.pvp_refs += 1;
        }
    }

    pub(crate) fn remove(&mut self, other: ObjectGuid, is_pvp: bool) {
        if self.opponents.remove(&other) && is_pvp {
            self.pvp_refs -= 1;
        }
    }

    /// Stores the derived flag and reports whether it flipped.
    pub(crate) fn set_in_combat(&mut self, value: bool) -> bool {
        let flipped = self.in_combat != value;
        self.in_combat = value;
        flipped
    }
}
