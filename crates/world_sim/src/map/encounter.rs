//! Encounter transitions driven by boss engage, death and evade.

use tracing::{debug, info, warn};

use super::{Map, MapTimer};
use crate::combat::CombatNotification;
use crate::encounter::{respawn_delay, EncounterState};
use crate::error::MapError;
use crate::events::WorldEvent;
use crate::scheduler::TimerOwner;
use crate::types::{ObjectGuid, Position};

/// Priority sent with the engage notification for bosses.
const BOSS_FRAME_PRIORITY: u8 = 1;

impl Map {
    /// Forces `boss_id` back to `NotStarted`, including from `Done`.
    pub fn reset_encounter(&mut self, boss_id: u32) -> EncounterState {
        let old = self.encounters.reset_encounter(boss_id);
        if old != EncounterState::NotStarted {
            info!(map = %self.id, boss_id, from = ?old, "🔄 Encounter reset");
            self.encounter_changed(boss_id, old, EncounterState::NotStarted);
        }
        old
    }

    fn set_encounter_state(&mut self, boss_id: u32, to: EncounterState) -> Result<(), MapError> {
        let from = self.encounters.set_state(boss_id, to)?;
        info!(map = %self.id, boss_id, ?from, ?to, "⚔️ Encounter state changed");
        self.encounter_changed(boss_id, from, to);
        Ok(())
    }

    fn encounter_changed(&mut self, boss_id: u32, from: EncounterState, to: EncounterState) {
        if let Some(script) = self.instance_script.as_mut() {
            script.on_encounter_state_change(boss_id, from, to);
        }
        self.notify_map(WorldEvent::EncounterStateChanged { boss_id, state: to });
    }

    pub(super) fn boss_engaged(&mut self, boss: ObjectGuid) -> Vec<CombatNotification> {
        let Some(boss_id) = self.unit(boss).and_then(|u| u.boss.as_ref()).map(|b| b.boss_id) else {
            return Vec::new();
        };
        if self.encounters.state(boss_id) == EncounterState::InProgress {
            return Vec::new();
        }

        let who = self
            .unit(boss)
            .and_then(|u| u.threat.current_target())
            .or_else(|| self.combat.opponents(boss).first().copied())
            .unwrap_or(ObjectGuid::EMPTY);
        let allowed = self
            .instance_script
            .as_ref()
            .map_or(true, |script| script.check_engage(boss_id, who));
        if !allowed {
            info!(map = %self.id, boss_id, %who, "🚫 Instance script refused engage");
            return self.enter_evade(boss);
        }

        if let Err(err) = self.set_encounter_state(boss_id, EncounterState::InProgress) {
            warn!(map = %self.id, %boss, error = %err, "Boss engaged outside of a startable encounter");
            return Vec::new();
        }
        if let Some(script) = self.instance_script.as_mut() {
            script.on_engage(boss_id, boss);
        }
        self.notify_map(WorldEvent::EncounterUnitEngaged {
            unit: boss,
            priority: BOSS_FRAME_PRIORITY,
        });
        Vec::new()
    }

    pub(super) fn boss_died(&mut self, boss: ObjectGuid) -> Vec<CombatNotification> {
        let Some(boss_id) = self.unit(boss).and_then(|u| u.boss.as_ref()).map(|b| b.boss_id) else {
            return Vec::new();
        };
        if let Err(err) = self.set_encounter_state(boss_id, EncounterState::Done) {
            warn!(map = %self.id, %boss, error = %err, "Boss died outside of its encounter");
        }
        self.cleanup_attempt(boss)
    }

    /// A boss evading mid-attempt fails the encounter: it is despawned and a
    /// world timer brings it back after the respawn delay.
    pub(super) fn boss_evaded(&mut self, boss: ObjectGuid) -> Vec<CombatNotification> {
        let Some((boss_id, requested)) = self
            .unit(boss)
            .and_then(|u| u.boss.as_ref())
            .map(|b| (b.boss_id, b.respawn_delay))
        else {
            return Vec::new();
        };
        if self.encounters.state(boss_id) != EncounterState::InProgress {
            return Vec::new();
        }
        if let Err(err) = self.set_encounter_state(boss_id, EncounterState::Fail) {
            warn!(map = %self.id, %boss, error = %err, "Could not fail encounter");
            return Vec::new();
        }

        let mut notes = self.cleanup_attempt(boss);
        let (entry, home) = match self.objects.get(&boss) {
            Some(object) => (
                object.entry,
                object.unit.as_ref().map_or(object.position, |u| u.home),
            ),
            None => return notes,
        };
        if let Some((_, more)) = self.despawn(boss) {
            notes.extend(more);
        }

        let Some(entry) = entry else {
            return notes;
        };
        let delay = respawn_delay(boss_id, requested);
        self.scheduler
            .schedule(delay, TimerOwner::World, MapTimer::RespawnBoss { guid: boss, entry, home });
        info!(map = %self.id, boss_id, delay_ms = delay.as_millis() as u64, "⏳ Boss respawn scheduled");
        notes
    }

    /// Despawns the attempt's summons and cancels the boss's own timers.
    fn cleanup_attempt(&mut self, boss: ObjectGuid) -> Vec<CombatNotification> {
        let summons = self
            .unit_mut(boss)
            .and_then(|u| u.boss.as_mut())
            .map(|b| std::mem::take(&mut b.summons))
            .unwrap_or_default();
        let cancelled = self.scheduler.cancel_owned_by(TimerOwner::Unit(boss));
        debug!(%boss, summons = summons.len(), cancelled, "Encounter attempt cleaned up");

        let mut notes = Vec::new();
        for summon in summons {
            if let Some((_, more)) = self.despawn(summon) {
                notes.extend(more);
            }
        }
        notes
    }

    pub(super) fn respawn_boss(&mut self, guid: ObjectGuid, entry: u32, home: Position) {
        if self.objects.contains_key(&guid) {
            debug!(%guid, "Boss already present, skipping respawn");
            return;
        }
        if let Err(err) = self.spawn_creature_as(guid, entry, home) {
            warn!(map = %self.id, %guid, entry, error = %err, "Boss respawn failed");
            return;
        }
        let boss_id = self.unit(guid).and_then(|u| u.boss.as_ref()).map(|b| b.boss_id);
        if let Some(boss_id) = boss_id {
            if let Err(err) = self.set_encounter_state(boss_id, EncounterState::NotStarted) {
                debug!(boss_id, error = %err, "Respawned boss with encounter not in Fail");
            }
        }
    }
}
