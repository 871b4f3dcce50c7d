use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, trace};

use super::manager::CombatManager;
use super::reference::{CombatPair, CombatReference};
use super::CombatNotification;
use crate::types::ObjectGuid;

/// All combat references on one map.
///
/// Each reference is stored once, keyed by its unordered pair, and both
/// participants' [`CombatManager`]s are updated inside the same call that
/// mutates it. Operations return the notifications they produced instead of
/// invoking callbacks, so the caller only reacts once both sides are
/// consistent.
#[derive(Debug, Default)]
pub struct CombatGraph {
    refs: HashMap<CombatPair, CombatReference>,
    managers: HashMap<ObjectGuid, CombatManager>,
}

impl CombatGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reference between `a` and `b`.
    ///
    /// # Arguments
    ///
    /// * `a` - The initiating unit, stored as `first`
    /// * `b` - The other participant
    /// * `is_pvp` - Whether the reference is between two player-controlled units
    ///
    /// # Returns
    ///
    /// `EngagedWith` for both sides followed by `EnteredCombat` for each side
    /// whose state flipped. Empty when `a == b` or the pair is already linked.
    pub fn engage(&mut self, a: ObjectGuid, b: ObjectGuid, is_pvp: bool) -> Vec<CombatNotification> {
        if a == b {
            debug!(unit = %a, "Rejected self-combat");
            return Vec::new();
        }
        let pair = CombatPair::new(a, b);
        if self.refs.contains_key(&pair) {
            return Vec::new();
        }

        self.refs.insert(pair, CombatReference::new(a, b, is_pvp));
        self.managers.entry(a).or_default().add(b, is_pvp);
        self.managers.entry(b).or_default().add(a, is_pvp);
        trace!(first = %a, second = %b, is_pvp, "Combat reference created");

        let mut notes = vec![
            CombatNotification::EngagedWith { unit: a, other: b },
            CombatNotification::EngagedWith { unit: b, other: a },
        ];
        for unit in [a, b] {
            if self.recompute(unit) == Some(true) {
                notes.push(CombatNotification::EnteredCombat { unit });
            }
        }
        notes
    }

    /// Removes the reference between `a` and `b`.
    ///
    /// `clear_threat(holder, target)` is called for both directions and the
    /// reference is gone from both managers before any notification is
    /// produced.
    pub fn end_combat<F>(&mut self, a: ObjectGuid, b: ObjectGuid, mut clear_threat: F) -> Vec<CombatNotification>
    where
        F: FnMut(ObjectGuid, ObjectGuid),
    {
        let Some(reference) = self.refs.remove(&CombatPair::new(a, b)) else {
            return Vec::new();
        };

        clear_threat(a, b);
        clear_threat(b, a);

        for (unit, other) in [(a, b), (b, a)] {
            if let Some(manager) = self.managers.get_mut(&unit) {
                manager.remove(other, reference.is_pvp);
            }
        }
        trace!(first = %reference.first, second = %reference.second, "Combat reference removed");

        let mut notes = Vec::new();
        for unit in [a, b] {
            if self.recompute(unit) == Some(false) {
                notes.push(CombatNotification::ExitedCombat { unit });
            }
            self.prune(unit);
        }
        notes
    }

    /// Ends every reference `unit` holds.
    pub fn end_all_combat<F>(&mut self, unit: ObjectGuid, mut clear_threat: F) -> Vec<CombatNotification>
    where
        F: FnMut(ObjectGuid, ObjectGuid),
    {
        let opponents: Vec<ObjectGuid> = match self.managers.get(&unit) {
            Some(manager) => manager.opponents().collect(),
            None => return Vec::new(),
        };
        let mut notes = Vec::new();
        for other in opponents {
            notes.extend(self.end_combat(unit, other, &mut clear_threat));
        }
        notes
    }

    /// Suppresses the reference between `a` and `b` on `who`'s side.
    ///
    /// Idempotent: suppressing an already suppressed side changes nothing and
    /// produces no notification.
    pub fn suppress(&mut self, a: ObjectGuid, b: ObjectGuid, who: ObjectGuid) -> Vec<CombatNotification> {
        let changed = match self.refs.get_mut(&CombatPair::new(a, b)) {
            Some(reference) => reference.suppress(who),
            None => false,
        };
        if changed && self.recompute(who) == Some(false) {
            return vec![CombatNotification::ExitedCombat { unit: who }];
        }
        Vec::new()
    }

    /// Suppresses every reference `who` holds, on `who`'s side.
    pub fn suppress_for(&mut self, who: ObjectGuid) -> Vec<CombatNotification> {
        let Some(manager) = self.managers.get(&who) else {
            return Vec::new();
        };
        let opponents: Vec<ObjectGuid> = manager.opponents().collect();
        let mut notes = Vec::new();
        for other in opponents {
            notes.extend(self.suppress(who, other, who));
        }
        notes
    }

    /// Lifts suppression on both sides and restarts the PvP timer.
    ///
    /// `EnteredCombat` is produced only for sides whose state flipped.
    pub fn refresh(&mut self, a: ObjectGuid, b: ObjectGuid) -> Vec<CombatNotification> {
        let Some(reference) = self.refs.get_mut(&CombatPair::new(a, b)) else {
            return Vec::new();
        };
        reference.refresh();

        let mut notes = Vec::new();
        for unit in [a, b] {
            if self.recompute(unit) == Some(true) {
                notes.push(CombatNotification::EnteredCombat { unit });
            }
        }
        notes
    }

    /// Counts down PvP references and returns the pairs that timed out.
    /// The caller ends them with [`CombatGraph::end_combat`].
    pub fn update(&mut self, diff: Duration) -> Vec<CombatPair> {
        let mut expired: Vec<CombatPair> = self
            .refs
            .iter_mut()
            .filter_map(|(pair, reference)| reference.tick_pvp(diff).then_some(*pair))
            .collect();
        expired.sort_unstable();
        expired
    }

    pub fn reference(&self, a: ObjectGuid, b: ObjectGuid) -> Option<&CombatReference> {
        self.refs.get(&CombatPair::new(a, b))
    }

    pub fn is_engaged(&self, a: ObjectGuid, b: ObjectGuid) -> bool {
        self.refs.contains_key(&CombatPair::new(a, b))
    }

    pub fn manager(&self, unit: ObjectGuid) -> Option<&CombatManager> {
        self.managers.get(&unit)
    }

    pub fn is_in_combat(&self, unit: ObjectGuid) -> bool {
        self.managers.get(&unit).is_some_and(CombatManager::is_in_combat)
    }

    pub fn opponents(&self, unit: ObjectGuid) -> Vec<ObjectGuid> {
        self.managers
            .get(&unit)
            .map(|manager| manager.opponents().collect())
            .unwrap_or_default()
    }

    pub fn reference_count(&self) -> usize {
        self.refs.len()
    }

    /// Recomputes `unit`'s in-combat flag from its references.
    ///
    /// Returns the new value if it flipped, `None` otherwise.
    fn recompute(&mut self, unit: ObjectGuid) -> Option<bool> {
        let manager = self.managers.get(&unit)?;
        let engaged = manager.opponents().any(|other| {
            self.refs
                .get(&CombatPair::new(unit, other))
                .is_some_and(|reference| !reference.is_suppressed_for(unit))
        });
        let manager = self.managers.get_mut(&unit)?;
        manager.set_in_combat(engaged).then_some(engaged)
    }

    fn prune(&mut self, unit: ObjectGuid) {
        if self
            .managers
            .get(&unit)
            .is_some_and(|manager| manager.reference_count() == 0 && !manager.is_in_combat())
        {
            self.managers.remove(&unit);
        }
    }
}
