//! A single simulated map.
//!
//! The map owns every object placed on it together with the spatial
//! partition, the combat graph, the scheduler and the encounter tracker.
//! All of it is plain `&mut self` state: a map is updated by exactly one
//! thread at a time and never shared during a tick.
//!
//! ## Tick order
//!
//! 1. Due timers (AI tasks, respawns, corpse decay, duel expiry)
//! 2. PvP combat timeouts
//! 3. Every object in an active cell, from a snapshot taken before the loop
//!
//! Combat notifications raised along the way are queued and handled one at
//! a time after the mutation that produced them has completed.

mod combat;
mod duel;
mod encounter;

pub use duel::DUEL_REQUEST_TIMEOUT;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ai::{AiAction, AiContext, UnitAI};
use crate::combat::{CombatGraph, CombatNotification};
use crate::encounter::{EncounterState, EncounterTracker, InstanceScript};
use crate::error::MapError;
use crate::events::{Notification, WorldEvent};
use crate::grid::{Relocation, SpatialPartition};
use crate::object::{CreatureTemplate, Faction, ObjectKind, Unit, WorldObject, MELEE_RANGE};
use crate::scheduler::{Scheduler, TimerOwner, TimerToken};
use crate::scripts::{ScriptRegistry, DEFAULT_CREATURE_AI};
use crate::threat::ThreatManager;
use crate::types::{HighGuid, MapId, ObjectGuid, Position, SessionId};

/// How far creatures move per second while chasing.
pub const RUN_SPEED: f32 = 7.0;

/// How long a dead creature stays before it is removed.
pub const CORPSE_DECAY: Duration = Duration::from_secs(60);

/// Per-map tuning taken from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MapSettings {
    /// Chebyshev radius, in cells, that a player keeps active around itself.
    pub activation_radius: u32,
    /// Radius in yards within which players receive updates about an object.
    pub visibility_distance: f32,
    /// Registered instance script to attach, if any.
    pub instance_script: Option<String>,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            activation_radius: 1,
            visibility_distance: 100.0,
            instance_script: None,
        }
    }
}

/// Static content shared by all maps: creature templates and scripts.
#[derive(Debug, Default)]
pub struct WorldContent {
    pub templates: HashMap<u32, CreatureTemplate>,
    pub scripts: ScriptRegistry,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MapTimer {
    AiTask { unit: ObjectGuid, task_id: u32 },
    RespawnBoss { guid: ObjectGuid, entry: u32, home: Position },
    DespawnCorpse { guid: ObjectGuid },
    DuelExpired { initiator: ObjectGuid, target: ObjectGuid },
}

#[derive(Debug, Clone, Copy)]
struct PendingDuel {
    initiator: ObjectGuid,
    session: SessionId,
    token: TimerToken,
}

pub struct Map {
    id: MapId,
    settings: MapSettings,
    content: Arc<WorldContent>,
    objects: HashMap<ObjectGuid, WorldObject>,
    partition: SpatialPartition,
    combat: CombatGraph,
    scheduler: Scheduler<MapTimer>,
    encounters: EncounterTracker,
    instance_script: Option<Box<dyn InstanceScript>>,
    /// Keyed by the challenged player.
    pending_duels: HashMap<ObjectGuid, PendingDuel>,
    outbox: Vec<Notification>,
    next_counter: u64,
    /// Length of the tick in progress, zero outside of `update`.
    tick_diff: Duration,
}

impl Map {
    pub fn new(id: MapId, settings: MapSettings, content: Arc<WorldContent>) -> Self {
        let instance_script = settings.instance_script.as_deref().and_then(|name| {
            let script = content.scripts.create_instance_script(name);
            if script.is_none() {
                warn!(map = %id, script = name, "Unknown instance script, map runs without one");
            }
            script
        });

        Self {
            id,
            partition: SpatialPartition::new(settings.activation_radius),
            settings,
            content,
            objects: HashMap::new(),
            combat: CombatGraph::new(),
            scheduler: Scheduler::new(),
            encounters: EncounterTracker::new(),
            instance_script,
            pending_duels: HashMap::new(),
            outbox: Vec::new(),
            // Spread creature counters per map so GUIDs stay unique world-wide.
            next_counter: (u64::from(id.0) << 32) + 1,
            tick_diff: Duration::ZERO,
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn id(&self) -> MapId {
        self.id
    }

    pub fn settings(&self) -> &MapSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn object(&self, guid: ObjectGuid) -> Option<&WorldObject> {
        self.objects.get(&guid)
    }

    pub fn unit(&self, guid: ObjectGuid) -> Option<&Unit> {
        self.objects.get(&guid).and_then(|o| o.unit.as_ref())
    }

    pub fn threat(&self, holder: ObjectGuid) -> Option<&ThreatManager> {
        self.unit(holder).map(|unit| &unit.threat)
    }

    pub fn partition(&self) -> &SpatialPartition {
        &self.partition
    }

    pub fn combat(&self) -> &CombatGraph {
        &self.combat
    }

    pub fn encounter_state(&self, boss_id: u32) -> EncounterState {
        self.encounters.state(boss_id)
    }

    pub fn player_count(&self) -> usize {
        self.objects.values().filter(|o| o.is_player_controlled()).count()
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.len()
    }

    /// Sessions of every player on the map, sorted.
    pub fn sessions(&self) -> Vec<SessionId> {
        let mut sessions: Vec<SessionId> = self.objects.values().filter_map(WorldObject::session).collect();
        sessions.sort_unstable();
        sessions
    }

    /// Takes the notifications recorded since the last call.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    // ------------------------------------------------------------------
    // Population
    // ------------------------------------------------------------------

    pub fn add_player(
        &mut self,
        guid: ObjectGuid,
        name: &str,
        session: SessionId,
        position: Position,
        faction: Faction,
    ) -> Result<(), MapError> {
        if !position.is_finite() {
            return Err(MapError::InvalidPosition);
        }
        if self.objects.contains_key(&guid) {
            return Err(MapError::DuplicateObject(guid));
        }
        let player = WorldObject::player(guid, name, self.id, position, session, faction);
        self.place(player);
        info!(map = %self.id, %guid, %session, name, "👤 Player entered map");
        Ok(())
    }

    /// Spawns a creature from its template and returns the new GUID.
    pub fn spawn_creature(&mut self, entry: u32, position: Position) -> Result<ObjectGuid, MapError> {
        let guid = ObjectGuid::new(HighGuid::Creature, self.next_counter);
        self.next_counter += 1;
        self.spawn_creature_as(guid, entry, position)?;
        Ok(guid)
    }

    fn spawn_creature_as(&mut self, guid: ObjectGuid, entry: u32, position: Position) -> Result<(), MapError> {
        if !position.is_finite() {
            return Err(MapError::InvalidPosition);
        }
        let template = self
            .content
            .templates
            .get(&entry)
            .ok_or(MapError::UnknownTemplate(entry))?;
        let ai_name = template.ai_name.as_deref().unwrap_or(DEFAULT_CREATURE_AI);
        let ai = self.content.scripts.create_ai(ai_name);
        if ai.is_none() {
            warn!(entry, ai = ai_name, "Creature AI not registered, creature will idle");
        }
        let creature = WorldObject::creature(guid, template, self.id, position, ai);
        debug!(map = %self.id, %guid, entry, name = %creature.name, "Creature spawned");
        self.place(creature);
        Ok(())
    }

    /// Places a game object or area trigger.
    pub fn spawn_object(&mut self, kind: ObjectKind, name: &str, position: Position) -> Result<ObjectGuid, MapError> {
        if !position.is_finite() {
            return Err(MapError::InvalidPosition);
        }
        let high = match kind {
            ObjectKind::AreaTrigger => HighGuid::AreaTrigger,
            _ => HighGuid::GameObject,
        };
        let guid = ObjectGuid::new(high, self.next_counter);
        self.next_counter += 1;
        self.place(WorldObject::plain(guid, kind, name, self.id, position));
        Ok(guid)
    }

    fn place(&mut self, object: WorldObject) {
        self.partition
            .insert(object.guid, object.position, object.is_player_controlled());
        self.objects.insert(object.guid, object);
    }

    /// Removes an object, ending its combat and cancelling its timers.
    pub fn remove_object(&mut self, guid: ObjectGuid) -> Result<WorldObject, MapError> {
        let (object, notes) = self.despawn(guid).ok_or(MapError::UnknownObject(guid))?;
        self.process(notes);
        Ok(object)
    }

    fn despawn(&mut self, guid: ObjectGuid) -> Option<(WorldObject, Vec<CombatNotification>)> {
        let position = self.objects.get(&guid)?.position;
        let on_death = self.objects.get(&guid).is_some_and(|o| o.is_unit() && !o.is_alive());
        let recipients = self.recipients_near(position, &[]);

        self.stop_attack(guid);
        self.stop_attackers_of(guid, on_death);
        let notes = self.end_all_combat_for(guid);
        self.scheduler.cancel_owned_by(TimerOwner::Unit(guid));
        self.drop_duels_of(guid);
        if let Some(session) = self.objects.get(&guid).and_then(WorldObject::session) {
            self.cancel_session_timers(session);
        }

        self.partition.remove(guid);
        let object = self.objects.remove(&guid)?;
        self.outbox.push(Notification {
            recipients,
            event: WorldEvent::ObjectDestroyed { guid, on_death },
        });
        debug!(map = %self.id, %guid, "Object removed");
        Some((object, notes))
    }

    /// Moves an object, keeping its cell membership current.
    pub fn relocate(&mut self, guid: ObjectGuid, position: Position) -> Result<Relocation, MapError> {
        if !position.is_finite() {
            return Err(MapError::InvalidPosition);
        }
        let object = self.objects.get_mut(&guid).ok_or(MapError::UnknownObject(guid))?;
        object.position = position;
        let relocation = self.partition.relocate(guid, position);
        let recipients = self.recipients_near(position, &[]);
        self.outbox.push(Notification {
            recipients,
            event: WorldEvent::ObjectMoved { guid, position },
        });
        Ok(relocation)
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advances the map by `diff`.
    pub fn update(&mut self, diff: Duration) {
        self.tick_diff = diff;

        for timer in self.scheduler.advance(diff) {
            let notes = self.run_timer(timer);
            self.process(notes);
        }

        for pair in self.combat.update(diff) {
            debug!(map = %self.id, low = %pair.low(), high = %pair.high(), "PvP combat timed out");
            let notes = self.end_combat_pair(pair.low(), pair.high());
            self.process(notes);
        }

        // Objects that change cell during the loop are neither skipped nor
        // visited twice because the snapshot is fixed up front.
        for guid in self.partition.update_snapshot() {
            if !self.objects.contains_key(&guid) {
                continue;
            }
            self.update_object(guid, diff);
        }

        self.tick_diff = Duration::ZERO;
    }

    fn update_object(&mut self, guid: ObjectGuid, diff: Duration) {
        let Some(object) = self.objects.get(&guid) else {
            return;
        };
        if !object.is_alive() {
            return;
        }
        if object.unit.as_ref().is_some_and(|u| u.ai.is_some()) {
            let notes = self.call_ai(guid, |ai, ctx| ai.update_ai(ctx, diff));
            self.process(notes);
        }
        self.update_melee(guid, diff);
    }

    fn run_timer(&mut self, timer: MapTimer) -> Vec<CombatNotification> {
        match timer {
            MapTimer::AiTask { unit, task_id } => {
                if !self.objects.get(&unit).is_some_and(WorldObject::is_alive) {
                    return Vec::new();
                }
                self.call_ai(unit, |ai, ctx| ai.on_scheduled_task(ctx, task_id))
            }
            MapTimer::RespawnBoss { guid, entry, home } => {
                self.respawn_boss(guid, entry, home);
                Vec::new()
            }
            MapTimer::DespawnCorpse { guid } => self.despawn(guid).map(|(_, notes)| notes).unwrap_or_default(),
            MapTimer::DuelExpired { initiator, target } => {
                self.expire_duel(initiator, target);
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Notification plumbing
    // ------------------------------------------------------------------

    /// Handles combat notifications until none are left. Handlers may
    /// produce further notifications, which are appended to the queue.
    fn process(&mut self, notes: Vec<CombatNotification>) {
        let mut queue: VecDeque<CombatNotification> = notes.into();
        while let Some(note) = queue.pop_front() {
            let more = match note {
                CombatNotification::EngagedWith { unit, other } => self.on_engaged_with(unit, other),
                CombatNotification::EnteredCombat { unit } => self.on_entered_combat(unit),
                CombatNotification::ExitedCombat { unit } => self.on_exited_combat(unit),
            };
            queue.extend(more);
        }
    }

    /// Sessions of players within visibility range of `position`, plus the
    /// sessions of `also`.
    fn recipients_near(&self, position: Position, also: &[ObjectGuid]) -> Vec<SessionId> {
        let mut sessions: Vec<SessionId> = self
            .partition
            .objects_near(position, self.settings.visibility_distance)
            .into_iter()
            .chain(also.iter().copied())
            .filter_map(|guid| self.objects.get(&guid).and_then(WorldObject::session))
            .collect();
        sessions.sort_unstable();
        sessions.dedup();
        sessions
    }

    fn notify_about(&mut self, subject: ObjectGuid, also: &[ObjectGuid], event: WorldEvent) {
        let Some(position) = self.objects.get(&subject).map(|o| o.position) else {
            return;
        };
        let mut with_subject = also.to_vec();
        with_subject.push(subject);
        let recipients = self.recipients_near(position, &with_subject);
        if recipients.is_empty() {
            return;
        }
        self.outbox.push(Notification { recipients, event });
    }

    fn notify_map(&mut self, event: WorldEvent) {
        let recipients = self.sessions();
        if recipients.is_empty() {
            return;
        }
        self.outbox.push(Notification { recipients, event });
    }

    // ------------------------------------------------------------------
    // AI plumbing
    // ------------------------------------------------------------------

    fn unit_mut(&mut self, guid: ObjectGuid) -> Option<&mut Unit> {
        self.objects.get_mut(&guid).and_then(|o| o.unit.as_mut())
    }

    fn is_hostile(&self, a: &WorldObject, b: &WorldObject) -> bool {
        match (&a.unit, &b.unit) {
            (Some(ua), Some(ub)) => ua.duel_opponent == Some(b.guid) || ua.faction.is_hostile_to(ub.faction),
            _ => false,
        }
    }

    fn ai_context(&self, guid: ObjectGuid) -> Option<AiContext> {
        let object = self.objects.get(&guid)?;
        let unit = object.unit.as_ref()?;

        let threat_target = unit
            .threat
            .current_target()
            .and_then(|target| self.objects.get(&target).map(|o| (target, o.position)));

        let mut hostiles_in_range: Vec<(ObjectGuid, Position)> = Vec::new();
        if unit.aggro_radius > 0.0 && unit.is_alive() {
            hostiles_in_range = self
                .partition
                .objects_near(object.position, unit.aggro_radius)
                .into_iter()
                .filter(|other| *other != guid)
                .filter_map(|other| self.objects.get(&other))
                .filter(|other| other.is_player_controlled() && other.is_alive() && self.is_hostile(object, other))
                .map(|other| (other.guid, other.position))
                .collect();
            hostiles_in_range.sort_by(|a, b| {
                a.1.distance_2d(&object.position)
                    .total_cmp(&b.1.distance_2d(&object.position))
                    .then(a.0.cmp(&b.0))
            });
        }

        Some(AiContext {
            me: guid,
            position: object.position,
            home: unit.home,
            health_pct: unit.health_pct(),
            in_combat: self.combat.is_in_combat(guid),
            victim: unit.victim,
            threat_target,
            hostiles_in_range,
        })
    }

    /// Runs an AI callback and applies the actions it returns.
    ///
    /// The AI is taken out of the unit for the duration of the call so the
    /// callback can be handed a context built from the rest of the map.
    fn call_ai<F>(&mut self, guid: ObjectGuid, callback: F) -> Vec<CombatNotification>
    where
        F: FnOnce(&mut dyn UnitAI, &AiContext) -> Vec<AiAction>,
    {
        let Some(ctx) = self.ai_context(guid) else {
            return Vec::new();
        };
        let Some(mut ai) = self.unit_mut(guid).and_then(|unit| unit.ai.take()) else {
            return Vec::new();
        };
        let actions = callback(ai.as_mut(), &ctx);
        if let Some(unit) = self.unit_mut(guid) {
            unit.ai = Some(ai);
        }
        self.apply_actions(guid, actions)
    }

    fn apply_actions(&mut self, guid: ObjectGuid, actions: Vec<AiAction>) -> Vec<CombatNotification> {
        let mut notes = Vec::new();
        for action in actions {
            match action {
                AiAction::Attack(target) => match self.start_attack(guid, target) {
                    Ok(more) => notes.extend(more),
                    Err(err) => debug!(%guid, %target, error = %err, "AI attack request rejected"),
                },
                AiAction::StopAttack => self.stop_attack(guid),
                AiAction::MoveTo(destination) => self.step_towards(guid, destination),
                AiAction::Summon { entry, position } => notes.extend(self.summon(guid, entry, position)),
                AiAction::ScheduleTask { delay, task_id } => {
                    self.scheduler
                        .schedule(delay, TimerOwner::Unit(guid), MapTimer::AiTask { unit: guid, task_id });
                }
                AiAction::Evade => notes.extend(self.enter_evade(guid)),
                AiAction::Despawn => {
                    if let Some((_, more)) = self.despawn(guid) {
                        notes.extend(more);
                    }
                    // Nothing else can apply to a unit that is gone.
                    break;
                }
                AiAction::Emote(emote) => debug!(%guid, emote, "Creature emote"),
            }
        }
        notes
    }

    /// Moves a creature up to one tick's worth of distance towards
    /// `destination`, stopping just inside melee range.
    fn step_towards(&mut self, guid: ObjectGuid, destination: Position) {
        let Some(current) = self.objects.get(&guid).map(|o| o.position) else {
            return;
        };
        let distance = current.distance_2d(&destination);
        let wanted = distance - (MELEE_RANGE - 1.0);
        let budget = RUN_SPEED * self.tick_diff.as_secs_f32();
        let step = wanted.min(budget);
        if step.is_nan() || step <= 0.0 || distance <= f32::EPSILON {
            return;
        }
        let ratio = step / distance;
        let mut next = current;
        next.x += (destination.x - current.x) * ratio;
        next.y += (destination.y - current.y) * ratio;
        next.z += (destination.z - current.z) * ratio;
        next.orientation = (destination.y - current.y).atan2(destination.x - current.x);
        if let Err(err) = self.relocate(guid, next) {
            debug!(%guid, error = %err, "Chase step rejected");
        }
    }

    fn summon(&mut self, summoner: ObjectGuid, entry: u32, position: Position) -> Vec<CombatNotification> {
        let summon = match self.spawn_creature(entry, position) {
            Ok(guid) => guid,
            Err(err) => {
                warn!(%summoner, entry, error = %err, "Summon failed");
                return Vec::new();
            }
        };

        let target = self.unit(summoner).and_then(|unit| unit.threat.current_target());
        if let Some(unit) = self.unit_mut(summon) {
            unit.summoner = Some(summoner);
        }
        if let Some(boss) = self.unit_mut(summoner).and_then(|unit| unit.boss.as_mut()) {
            boss.summons.insert(summon);
        }

        let mut notes = Vec::new();
        if let Some(target) = target {
            match self.start_attack(summon, target) {
                Ok(more) => notes.extend(more),
                Err(err) => debug!(%summon, %target, error = %err, "Summon could not engage"),
            }
        }
        notes.extend(self.call_ai(summoner, |ai, ctx| ai.just_summoned(ctx, summon)));
        notes
    }
}

impl std::fmt::Debug for Map {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map")
            .field("id", &self.id)
            .field("objects", &self.objects.len())
            .field("combat_refs", &self.combat.reference_count())
            .field("timers", &self.scheduler.len())
            .field("instance_script", &self.instance_script.as_ref().map(|s| s.name()))
            .finish()
    }
}
