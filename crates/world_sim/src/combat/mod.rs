//! Combat reference graph.
//!
//! Units that fight each other share a [`CombatReference`]. A unit is in
//! combat while it holds at least one reference that is not suppressed on
//! its side. The graph owns every reference; the per-unit
//! [`CombatManager`] is a view kept in sync by the graph.

mod graph;
mod manager;
mod reference;

pub use graph::CombatGraph;
pub use manager::CombatManager;
pub use reference::{CombatPair, CombatReference, PVP_COMBAT_TIMEOUT};

use crate::types::ObjectGuid;

/// Something the owner of the graph must react to, emitted after both sides
/// of the reference have been updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatNotification {
    /// `unit` gained a reference with `other`.
    EngagedWith { unit: ObjectGuid, other: ObjectGuid },
    /// `unit` went from out of combat to in combat.
    EnteredCombat { unit: ObjectGuid },
    /// `unit` went from in combat to out of combat.
    ExitedCombat { unit: ObjectGuid },
}

impl CombatNotification {
    pub fn unit(&self) -> ObjectGuid {
        match *self {
            CombatNotification::EngagedWith { unit, .. }
            | CombatNotification::EnteredCombat { unit }
            | CombatNotification::ExitedCombat { unit } => unit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HighGuid;
    use std::time::Duration;

    fn guid(n: u64) -> ObjectGuid {
        ObjectGuid::new(HighGuid::Creature, n)
    }

    #[test]
    fn engage_is_symmetric() {
        let mut graph = CombatGraph::new();
        let (a, b) = (guid(1), guid(2));
        let notes = graph.engage(a, b, false);

        assert_eq!(
            notes,
            vec![
                CombatNotification::EngagedWith { unit: a, other: b },
                CombatNotification::EngagedWith { unit: b, other: a },
                CombatNotification::EnteredCombat { unit: a },
                CombatNotification::EnteredCombat { unit: b },
            ]
        );
        assert!(graph.is_in_combat(a) && graph.is_in_combat(b));
        assert!(graph.manager(a).unwrap().has_opponent(b));
        assert!(graph.manager(b).unwrap().has_opponent(a));

        let reference = graph.reference(b, a).unwrap();
        assert_eq!(reference.first, a);
        assert_eq!(reference.get_other(a), Some(b));
        assert_eq!(reference.get_other(guid(9)), None);
    }

    #[test]
    fn engage_twice_and_self_engage_are_noops() {
        let mut graph = CombatGraph::new();
        let (a, b) = (guid(1), guid(2));
        assert!(graph.engage(a, a, false).is_empty());
        assert!(!graph.is_in_combat(a));

        graph.engage(a, b, false);
        assert!(graph.engage(b, a, true).is_empty());
        assert_eq!(graph.reference_count(), 1);
        assert!(!graph.reference(a, b).unwrap().is_pvp);
    }

    #[test]
    fn end_combat_clears_threat_before_notifying() {
        let mut graph = CombatGraph::new();
        let (a, b) = (guid(1), guid(2));
        graph.engage(a, b, false);

        let mut cleared = Vec::new();
        let notes = graph.end_combat(a, b, |holder, target| cleared.push((holder, target)));
        assert_eq!(cleared, vec![(a, b), (b, a)]);
        assert_eq!(
            notes,
            vec![
                CombatNotification::ExitedCombat { unit: a },
                CombatNotification::ExitedCombat { unit: b },
            ]
        );
        assert!(graph.reference(a, b).is_none());
        assert!(graph.manager(a).is_none());
        assert!(graph.end_combat(a, b, |_, _| {}).is_empty());
    }

    #[test]
    fn suppression_is_idempotent_and_one_sided() {
        let mut graph = CombatGraph::new();
        let (a, b) = (guid(1), guid(2));
        graph.engage(a, b, false);

        let first = graph.suppress(a, b, a);
        assert_eq!(first, vec![CombatNotification::ExitedCombat { unit: a }]);
        assert!(!graph.is_in_combat(a));
        assert!(graph.is_in_combat(b));
        let snapshot = graph.reference(a, b).cloned();

        assert!(graph.suppress(a, b, a).is_empty());
        assert_eq!(graph.reference(a, b).cloned(), snapshot);
        assert!(!graph.is_in_combat(a));
    }

    #[test]
    fn refresh_only_notifies_flipped_sides() {
        let mut graph = CombatGraph::new();
        let (a, b) = (guid(1), guid(2));
        graph.engage(a, b, false);
        graph.suppress(a, b, a);

        let notes = graph.refresh(a, b);
        assert_eq!(notes, vec![CombatNotification::EnteredCombat { unit: a }]);
        assert!(graph.is_in_combat(a));
    }

    #[test]
    fn suppress_for_covers_every_reference() {
        let mut graph = CombatGraph::new();
        let (a, b, c) = (guid(1), guid(2), guid(3));
        graph.engage(a, b, false);
        graph.engage(c, a, false);

        let notes = graph.suppress_for(a);
        assert_eq!(notes, vec![CombatNotification::ExitedCombat { unit: a }]);
        assert!(graph.reference(a, b).unwrap().is_suppressed_for(a));
        assert!(graph.reference(a, c).unwrap().is_suppressed_for(a));
        assert!(graph.is_in_combat(b) && graph.is_in_combat(c));
    }

    #[test]
    fn pvp_references_time_out_unless_refreshed() {
        let mut graph = CombatGraph::new();
        let (a, b) = (ObjectGuid::new(HighGuid::Player, 1), ObjectGuid::new(HighGuid::Player, 2));
        graph.engage(a, b, true);
        assert!(graph.manager(a).unwrap().has_pvp_combat());
        assert!(!graph.manager(a).unwrap().has_pve_combat());

        assert!(graph.update(Duration::from_secs(4)).is_empty());
        graph.refresh(a, b);
        assert!(graph.update(Duration::from_secs(4)).is_empty());
        assert_eq!(graph.update(Duration::from_secs(1)), vec![CombatPair::new(a, b)]);
    }

    #[test]
    fn end_all_combat_releases_every_opponent() {
        let mut graph = CombatGraph::new();
        let (a, b, c) = (guid(1), guid(2), guid(3));
        graph.engage(a, b, false);
        graph.engage(a, c, false);

        let notes = graph.end_all_combat(a, |_, _| {});
        assert_eq!(notes.len(), 3);
        assert!(notes.contains(&CombatNotification::ExitedCombat { unit: a }));
        assert_eq!(graph.reference_count(), 0);
        assert!(graph.opponents(a).is_empty());
    }
}
