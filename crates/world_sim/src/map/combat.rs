//! Attacking, damage, death and evade.

use std::time::Duration;

use tracing::{debug, info};

use super::{Map, MapTimer, CORPSE_DECAY};
use crate::combat::CombatNotification;
use crate::encounter::EncounterState;
use crate::error::MapError;
use crate::events::WorldEvent;
use crate::object::{WorldObject, MELEE_RANGE};
use crate::scheduler::TimerOwner;
use crate::types::ObjectGuid;

impl Map {
    /// Makes `attacker` start auto-attacking `victim` and engages the pair.
    pub fn attack_start(&mut self, attacker: ObjectGuid, victim: ObjectGuid) -> Result<(), MapError> {
        let notes = self.start_attack(attacker, victim)?;
        self.process(notes);
        Ok(())
    }

    /// Stops `attacker`'s auto-attack. Combat itself continues until it
    /// times out or is ended.
    pub fn attack_stop(&mut self, attacker: ObjectGuid) -> Result<(), MapError> {
        if !self.objects.contains_key(&attacker) {
            return Err(MapError::UnknownObject(attacker));
        }
        self.stop_attack(attacker);
        Ok(())
    }

    /// Suppresses every combat reference on the player's side and drops the
    /// player from opponents' threat lists. Opponents keep their own side
    /// and evade once they have nothing left to attack.
    pub fn feign_death(&mut self, guid: ObjectGuid) -> Result<(), MapError> {
        let object = self.objects.get(&guid).ok_or(MapError::UnknownObject(guid))?;
        if !object.is_player_controlled() {
            return Err(MapError::NotAUnit(guid));
        }
        if !object.is_alive() {
            return Err(MapError::Dead(guid));
        }

        self.stop_attack(guid);
        let opponents = self.combat.opponents(guid);
        let notes = self.combat.suppress_for(guid);
        for opponent in opponents {
            self.clear_threat_entry(opponent, guid);
        }
        debug!(%guid, "Feign death");
        self.process(notes);
        Ok(())
    }

    /// Applies `amount` damage from `attacker` to `victim`.
    ///
    /// Engages or refreshes combat, adds threat on creatures and kills the
    /// victim once its health reaches zero. A blow that would kill a duel
    /// opponent leaves them at 1 health and ends the duel instead.
    pub fn deal_damage(&mut self, attacker: ObjectGuid, victim: ObjectGuid, amount: u32) -> Result<(), MapError> {
        self.check_attack(attacker, victim)?;

        let is_duel = self.unit(attacker).and_then(|unit| unit.duel_opponent) == Some(victim);
        let (applied, overkill, duel_won) = {
            let unit = self.unit_mut(victim).ok_or(MapError::NotAUnit(victim))?;
            let duel_won = is_duel && amount >= unit.health;
            let applied = if duel_won {
                unit.health - 1
            } else {
                amount.min(unit.health)
            };
            unit.health -= applied;
            let overkill = if duel_won { 0 } else { amount - applied };
            (applied, overkill, duel_won)
        };

        self.notify_about(
            victim,
            &[attacker],
            WorldEvent::MeleeHit {
                attacker,
                victim,
                damage: applied,
                overkill,
            },
        );

        if duel_won {
            self.finish_duel(attacker, victim);
            return Ok(());
        }

        let notes = if self.combat.is_engaged(attacker, victim) {
            self.combat.refresh(attacker, victim)
        } else {
            let pvp = self.both_player_controlled(attacker, victim);
            self.combat.engage(attacker, victim, pvp)
        };
        if !self.objects.get(&victim).is_some_and(WorldObject::is_player_controlled) {
            self.add_threat(victim, attacker, applied as f32);
        }
        self.process(notes);

        // Handlers above may have reset the victim (an evading boss heals).
        if self.unit(victim).is_some_and(|unit| unit.health == 0) {
            self.handle_death(victim, Some(attacker));
        }
        Ok(())
    }

    /// Kills `victim` outright.
    pub fn kill(&mut self, victim: ObjectGuid, killer: Option<ObjectGuid>) -> Result<(), MapError> {
        let object = self.objects.get(&victim).ok_or(MapError::UnknownObject(victim))?;
        if !object.is_unit() {
            return Err(MapError::NotAUnit(victim));
        }
        if !object.is_alive() {
            return Err(MapError::Dead(victim));
        }
        if let Some(unit) = self.unit_mut(victim) {
            unit.health = 0;
        }
        self.handle_death(victim, killer);
        Ok(())
    }

    /// Runs everything that follows a unit reaching zero health.
    fn handle_death(&mut self, victim: ObjectGuid, killer: Option<ObjectGuid>) {
        let Some(object) = self.objects.get(&victim) else {
            return;
        };
        let entry = object.entry;
        let player = object.is_player_controlled();

        info!(map = %self.id, %victim, killer = ?killer, "💀 Unit died");
        let mut notes = self.call_ai(victim, |ai, ctx| ai.just_died(ctx, killer));

        self.stop_attack(victim);
        self.stop_attackers_of(victim, true);
        if let Some(unit) = self.unit_mut(victim) {
            unit.threat.clear_all_threat();
        }
        notes.extend(self.end_all_combat_for(victim));

        if let Some(script) = self.instance_script.as_mut() {
            script.on_unit_death(victim, entry);
        }

        let summoner = self.unit(victim).and_then(|unit| unit.summoner);
        if let Some(boss) = summoner.and_then(|boss| self.unit_mut(boss)).and_then(|u| u.boss.as_mut()) {
            boss.summons.remove(&victim);
        }

        if player {
            self.drop_duels_of(victim);
        } else {
            if self.unit(victim).is_some_and(|unit| unit.boss.is_some()) {
                notes.extend(self.boss_died(victim));
            }
            self.scheduler
                .schedule(CORPSE_DECAY, TimerOwner::World, MapTimer::DespawnCorpse { guid: victim });
        }

        self.process(notes);
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn check_attack(&self, attacker: ObjectGuid, victim: ObjectGuid) -> Result<(), MapError> {
        let a = self.objects.get(&attacker).ok_or(MapError::UnknownObject(attacker))?;
        let v = self.objects.get(&victim).ok_or(MapError::UnknownObject(victim))?;
        if !a.is_unit() {
            return Err(MapError::NotAUnit(attacker));
        }
        if !v.is_unit() {
            return Err(MapError::NotAUnit(victim));
        }
        if !a.is_alive() {
            return Err(MapError::Dead(attacker));
        }
        if !v.is_alive() {
            return Err(MapError::Dead(victim));
        }
        if attacker == victim {
            return Err(MapError::InvalidTarget {
                attacker,
                victim,
                reason: "cannot attack self",
            });
        }
        if !self.is_hostile(a, v) {
            return Err(MapError::InvalidTarget {
                attacker,
                victim,
                reason: "target is not hostile",
            });
        }
        Ok(())
    }

    fn both_player_controlled(&self, a: ObjectGuid, b: ObjectGuid) -> bool {
        [a, b]
            .iter()
            .all(|guid| self.objects.get(guid).is_some_and(WorldObject::is_player_controlled))
    }

    pub(super) fn start_attack(
        &mut self,
        attacker: ObjectGuid,
        victim: ObjectGuid,
    ) -> Result<Vec<CombatNotification>, MapError> {
        self.check_attack(attacker, victim)?;

        let previous = self.unit(attacker).and_then(|unit| unit.victim);
        if previous != Some(victim) {
            self.stop_attack(attacker);
            if let Some(unit) = self.unit_mut(attacker) {
                unit.victim = Some(victim);
            }
            self.notify_about(attacker, &[victim], WorldEvent::AttackStarted { attacker, victim });
        }

        let notes = if self.combat.is_engaged(attacker, victim) {
            self.combat.refresh(attacker, victim)
        } else {
            let pvp = self.both_player_controlled(attacker, victim);
            self.combat.engage(attacker, victim, pvp)
        };
        Ok(notes)
    }

    pub(super) fn stop_attack(&mut self, attacker: ObjectGuid) {
        let Some(victim) = self.unit_mut(attacker).and_then(|unit| unit.victim.take()) else {
            return;
        };
        self.notify_about(
            attacker,
            &[victim],
            WorldEvent::AttackStopped {
                attacker,
                victim,
                now_dead: false,
            },
        );
    }

    /// Makes everyone swinging at `victim` stop.
    pub(super) fn stop_attackers_of(&mut self, victim: ObjectGuid, now_dead: bool) {
        let mut attackers: Vec<ObjectGuid> = self
            .objects
            .values()
            .filter(|o| o.unit.as_ref().is_some_and(|unit| unit.victim == Some(victim)))
            .map(|o| o.guid)
            .collect();
        attackers.sort_unstable();

        for attacker in attackers {
            if let Some(unit) = self.unit_mut(attacker) {
                unit.victim = None;
            }
            self.notify_about(
                attacker,
                &[victim],
                WorldEvent::AttackStopped {
                    attacker,
                    victim,
                    now_dead,
                },
            );
        }
    }

    pub(super) fn end_combat_pair(&mut self, a: ObjectGuid, b: ObjectGuid) -> Vec<CombatNotification> {
        let mut cleared = Vec::new();
        let notes = self
            .combat
            .end_combat(a, b, |holder, target| cleared.push((holder, target)));
        for (holder, target) in cleared {
            self.clear_threat_entry(holder, target);
        }
        notes
    }

    pub(super) fn end_all_combat_for(&mut self, unit: ObjectGuid) -> Vec<CombatNotification> {
        let mut cleared = Vec::new();
        let notes = self
            .combat
            .end_all_combat(unit, |holder, target| cleared.push((holder, target)));
        for (holder, target) in cleared {
            self.clear_threat_entry(holder, target);
        }
        notes
    }

    fn clear_threat_entry(&mut self, holder: ObjectGuid, target: ObjectGuid) {
        let removed = self
            .unit_mut(holder)
            .is_some_and(|unit| unit.threat.clear_threat(target));
        if removed {
            self.notify_about(holder, &[], WorldEvent::ThreatRemoved { unit: holder, about: target });
        }
    }

    fn add_threat(&mut self, holder: ObjectGuid, target: ObjectGuid, amount: f32) {
        let Some(unit) = self.unit_mut(holder) else {
            return;
        };
        let highest_changed = unit.threat.add_threat(target, amount);
        let entries = unit.threat.sorted_list();
        self.notify_about(
            holder,
            &[],
            WorldEvent::ThreatUpdated {
                unit: holder,
                highest_changed,
                entries,
            },
        );
    }

    // ------------------------------------------------------------------
    // Notification handlers
    // ------------------------------------------------------------------

    pub(super) fn on_engaged_with(&mut self, unit: ObjectGuid, other: ObjectGuid) -> Vec<CombatNotification> {
        let Some(object) = self.objects.get(&unit) else {
            return Vec::new();
        };
        if !object.is_alive() {
            return Vec::new();
        }
        if !object.is_player_controlled() && !object.unit.as_ref().is_some_and(|u| u.threat.contains(other)) {
            self.add_threat(unit, other, 0.0);
        }
        self.call_ai(unit, |ai, ctx| ai.just_engaged_with(ctx, other))
    }

    pub(super) fn on_entered_combat(&mut self, unit: ObjectGuid) -> Vec<CombatNotification> {
        if !self.objects.get(&unit).is_some_and(WorldObject::is_alive) {
            return Vec::new();
        }
        debug!(%unit, "Entered combat");
        let mut notes = self.call_ai(unit, |ai, ctx| ai.just_entered_combat(ctx));
        if self.unit(unit).is_some_and(|u| u.boss.is_some()) {
            notes.extend(self.boss_engaged(unit));
        }
        notes
    }

    pub(super) fn on_exited_combat(&mut self, unit: ObjectGuid) -> Vec<CombatNotification> {
        let Some(object) = self.objects.get(&unit) else {
            return Vec::new();
        };
        if !object.is_alive() {
            return Vec::new();
        }
        let creature = !object.is_player_controlled();
        debug!(%unit, "Left combat");
        let mut notes = self.call_ai(unit, |ai, ctx| ai.just_exited_combat(ctx));
        if creature {
            notes.extend(self.enter_evade(unit));
        }
        notes
    }

    fn needs_evade(&self, guid: ObjectGuid) -> bool {
        let Some(object) = self.objects.get(&guid) else {
            return false;
        };
        let Some(unit) = object.unit.as_ref() else {
            return false;
        };
        if !unit.is_alive() || unit.is_player_controlled() {
            return false;
        }
        let attempt_running = unit
            .boss
            .as_ref()
            .is_some_and(|boss| self.encounters.state(boss.boss_id) == EncounterState::InProgress);
        attempt_running
            || self.combat.manager(guid).is_some()
            || !unit.threat.is_empty()
            || unit.victim.is_some()
            || unit.health < unit.max_health
            || object.position.distance(&unit.home) > 0.01
    }

    /// Drops all combat, returns home at full health and notifies the AI.
    /// Calling it on a creature that is already reset does nothing.
    pub(super) fn enter_evade(&mut self, guid: ObjectGuid) -> Vec<CombatNotification> {
        if !self.needs_evade(guid) {
            return Vec::new();
        }
        debug!(map = %self.id, %guid, "Creature evading");

        self.stop_attack(guid);
        let had_threat = self.unit_mut(guid).is_some_and(|unit| {
            let had = !unit.threat.is_empty();
            unit.threat.clear_all_threat();
            had
        });
        if had_threat {
            self.notify_about(guid, &[], WorldEvent::ThreatCleared { unit: guid });
        }
        let mut notes = self.end_all_combat_for(guid);

        let home = self.unit_mut(guid).map(|unit| {
            unit.health = unit.max_health;
            unit.attack_timer = Duration::ZERO;
            unit.home
        });
        if let Some(home) = home {
            let away = self.objects.get(&guid).is_some_and(|o| o.position != home);
            if away {
                if let Err(err) = self.relocate(guid, home) {
                    debug!(%guid, error = %err, "Could not return home");
                }
            }
        }

        // Tasks scheduled during the fight do not outlive it.
        self.scheduler.cancel_owned_by(TimerOwner::Unit(guid));
        notes.extend(self.call_ai(guid, |ai, ctx| ai.enter_evade_mode(ctx)));
        if self.unit(guid).is_some_and(|unit| unit.boss.is_some()) {
            notes.extend(self.boss_evaded(guid));
        }
        notes
    }

    /// Counts down the swing timer and lands a hit once it is ready and the
    /// victim is in melee range.
    pub(super) fn update_melee(&mut self, guid: ObjectGuid, diff: Duration) {
        let Some(object) = self.objects.get(&guid) else {
            return;
        };
        let Some(unit) = object.unit.as_ref() else {
            return;
        };
        let Some(victim) = unit.victim else {
            return;
        };
        let position = object.position;

        let target = self.objects.get(&victim).map(|v| (v.position, v.is_alive()));
        let Some((victim_pos, alive)) = target else {
            self.stop_attack(guid);
            return;
        };
        if !alive {
            self.stop_attack(guid);
            return;
        }

        let Some(unit) = self.unit_mut(guid) else {
            return;
        };
        unit.attack_timer = unit.attack_timer.saturating_sub(diff);
        if !unit.attack_timer.is_zero() || position.distance_2d(&victim_pos) > MELEE_RANGE {
            return;
        }
        unit.attack_timer = unit.attack_interval;
        let damage = unit.swing_damage();

        if let Err(err) = self.deal_damage(guid, victim, damage) {
            debug!(attacker = %guid, %victim, error = %err, "Swing rejected");
            self.stop_attack(guid);
        }
    }
}
