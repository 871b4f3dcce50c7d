//! Player duels.
//!
//! A pending request is held by the challenged player and backed by a
//! session-owned expiry timer, so it disappears with the challenger's
//! session. An accepted duel makes the pair hostile to each other until one
//! of them is beaten down to 1 health.

use std::time::Duration;

use tracing::{debug, info};

use super::{Map, MapTimer, PendingDuel};
use crate::error::MapError;
use crate::events::{DuelOutcome, WorldEvent};
use crate::object::WorldObject;
use crate::scheduler::TimerOwner;
use crate::types::{ObjectGuid, SessionId};

/// How long a duel request waits for an answer.
pub const DUEL_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

impl Map {
    pub fn propose_duel(&mut self, initiator: ObjectGuid, target: ObjectGuid) -> Result<(), MapError> {
        let invalid = |reason| MapError::InvalidTarget {
            attacker: initiator,
            victim: target,
            reason,
        };
        let challenger = self.objects.get(&initiator).ok_or(MapError::UnknownObject(initiator))?;
        let challenged = self.objects.get(&target).ok_or(MapError::UnknownObject(target))?;
        if initiator == target {
            return Err(invalid("cannot duel self"));
        }
        if !challenger.is_player_controlled() || !challenged.is_player_controlled() {
            return Err(invalid("duels are between players"));
        }
        if !challenger.is_alive() || !challenged.is_alive() {
            return Err(invalid("dead players cannot duel"));
        }
        let dueling = |o: &WorldObject| o.unit.as_ref().is_some_and(|u| u.duel_opponent.is_some());
        if dueling(challenger) || dueling(challenged) {
            return Err(invalid("already dueling"));
        }
        if self.pending_duels.contains_key(&target) {
            return Err(invalid("target already has a pending request"));
        }
        let Some(session) = challenger.session() else {
            return Err(invalid("duels are between players"));
        };

        let token = self.scheduler.schedule(
            DUEL_REQUEST_TIMEOUT,
            TimerOwner::Session(session),
            MapTimer::DuelExpired { initiator, target },
        );
        self.pending_duels.insert(
            target,
            PendingDuel {
                initiator,
                session,
                token,
            },
        );
        debug!(%initiator, %target, "Duel requested");
        self.notify_about(target, &[initiator], WorldEvent::DuelRequested { initiator, target });
        Ok(())
    }

    /// Answers the request `initiator` sent to `target`.
    pub fn respond_duel(&mut self, target: ObjectGuid, initiator: ObjectGuid, accepted: bool) -> Result<(), MapError> {
        match self.pending_duels.get(&target) {
            Some(pending) if pending.initiator == initiator => {}
            _ => return Err(MapError::NoPendingDuel { initiator, target }),
        }
        let Some(pending) = self.pending_duels.remove(&target) else {
            return Err(MapError::NoPendingDuel { initiator, target });
        };
        self.scheduler.cancel(pending.token);

        if !accepted {
            self.duel_finished(initiator, target, DuelOutcome::Declined);
            return Ok(());
        }
        // Either player may have died or left since the request went out.
        if !self.objects.get(&initiator).is_some_and(WorldObject::is_alive)
            || !self.objects.get(&target).is_some_and(WorldObject::is_alive)
        {
            self.duel_finished(initiator, target, DuelOutcome::Cancelled);
            return Ok(());
        }

        for (me, other) in [(initiator, target), (target, initiator)] {
            if let Some(unit) = self.unit_mut(me) {
                unit.duel_opponent = Some(other);
            }
        }
        info!(map = %self.id, %initiator, %target, "🤺 Duel started");
        self.duel_finished(initiator, target, DuelOutcome::Started);
        let notes = self.combat.engage(initiator, target, true);
        self.process(notes);
        Ok(())
    }

    /// Cancels every timer owned by `session`, dropping its pending duel
    /// requests on the way. World and unit timers are untouched.
    pub fn cancel_session_timers(&mut self, session: SessionId) -> usize {
        let mut requests: Vec<(ObjectGuid, PendingDuel)> = self
            .pending_duels
            .iter()
            .filter(|(_, pending)| pending.session == session)
            .map(|(target, pending)| (*target, *pending))
            .collect();
        requests.sort_unstable_by_key(|(target, _)| *target);

        let mut cancelled = 0;
        for (target, pending) in requests {
            self.pending_duels.remove(&target);
            if self.scheduler.cancel(pending.token) {
                cancelled += 1;
            }
            self.duel_finished(pending.initiator, target, DuelOutcome::Cancelled);
        }
        cancelled + self.scheduler.cancel_owned_by(TimerOwner::Session(session))
    }

    pub(super) fn expire_duel(&mut self, initiator: ObjectGuid, target: ObjectGuid) {
        if self
            .pending_duels
            .get(&target)
            .is_some_and(|pending| pending.initiator == initiator)
        {
            self.pending_duels.remove(&target);
            debug!(%initiator, %target, "Duel request expired");
            self.duel_finished(initiator, target, DuelOutcome::Expired);
        }
    }

    /// Ends an accepted duel with `winner` on top.
    pub(super) fn finish_duel(&mut self, winner: ObjectGuid, loser: ObjectGuid) {
        for guid in [winner, loser] {
            if let Some(unit) = self.unit_mut(guid) {
                unit.duel_opponent = None;
            }
            self.stop_attack(guid);
        }
        info!(map = %self.id, %winner, %loser, "🏆 Duel won");
        self.duel_finished(winner, loser, DuelOutcome::Won);
        let notes = self.end_combat_pair(winner, loser);
        self.process(notes);
    }

    /// Drops every pending or active duel involving `guid`.
    pub(super) fn drop_duels_of(&mut self, guid: ObjectGuid) {
        let mut pending: Vec<(ObjectGuid, PendingDuel)> = self
            .pending_duels
            .iter()
            .filter(|(target, p)| **target == guid || p.initiator == guid)
            .map(|(target, p)| (*target, *p))
            .collect();
        pending.sort_unstable_by_key(|(target, _)| *target);
        for (target, request) in pending {
            self.pending_duels.remove(&target);
            self.scheduler.cancel(request.token);
            self.duel_finished(request.initiator, target, DuelOutcome::Cancelled);
        }

        let opponent = self.unit_mut(guid).and_then(|unit| unit.duel_opponent.take());
        if let Some(opponent) = opponent {
            if let Some(unit) = self.unit_mut(opponent) {
                unit.duel_opponent = None;
            }
            self.duel_finished(guid, opponent, DuelOutcome::Cancelled);
        }
    }

    fn duel_finished(&mut self, initiator: ObjectGuid, target: ObjectGuid, outcome: DuelOutcome) {
        let event = WorldEvent::DuelFinished {
            initiator,
            target,
            outcome,
        };
        if self.objects.contains_key(&target) {
            self.notify_about(target, &[initiator], event);
        } else {
            self.notify_about(initiator, &[target], event);
        }
    }
}
