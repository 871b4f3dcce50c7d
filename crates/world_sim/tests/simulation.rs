//! Map-level scenarios: combat, threat, encounters, duels and the grid
//! interacting through a real `Map`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use world_sim::{
    AiAction, AiContext, CellCoord, CreatureTemplate, DuelOutcome, EncounterState, Faction, HighGuid,
    InstanceScript, Map, MapError, MapId, MapSettings, ObjectGuid, Position, ScriptRegistry, SessionId,
    UnitAI, WorldContent, WorldEvent, DUEL_REQUEST_TIMEOUT, MIN_RESPAWN_DELAY,
};

const KOBOLD: u32 = 1;
const HOGGER: u32 = 10;
const GNOLL: u32 = 11;
const WANDERER: u32 = 20;
const HOGGER_BOSS_ID: u32 = 1;

fn template(entry: u32, name: &str) -> CreatureTemplate {
    CreatureTemplate {
        entry,
        name: name.to_string(),
        max_health: 100,
        faction: Faction::Monster,
        min_damage: 10,
        max_damage: 10,
        attack_time_ms: 2000,
        aggro_radius: 0.0,
        ai_name: None,
        boss_id: None,
        respawn_delay_secs: 30,
    }
}

/// Counts `update_ai` calls and always walks east.
struct WanderAI {
    calls: Arc<AtomicUsize>,
}

impl UnitAI for WanderAI {
    fn name(&self) -> &'static str {
        "wander"
    }

    fn update_ai(&mut self, ctx: &AiContext, _diff: Duration) -> Vec<AiAction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut destination = ctx.position;
        destination.x += 100.0;
        vec![AiAction::MoveTo(destination)]
    }
}

/// Refuses every engage.
struct SealedInstance;

impl InstanceScript for SealedInstance {
    fn name(&self) -> &'static str {
        "sealed"
    }

    fn check_engage(&self, _boss_id: u32, _who: ObjectGuid) -> bool {
        false
    }
}

fn content(wander_calls: Arc<AtomicUsize>) -> Arc<WorldContent> {
    let mut templates = HashMap::new();
    templates.insert(KOBOLD, template(KOBOLD, "Kobold Vermin"));

    let mut hogger = template(HOGGER, "Hogger");
    hogger.max_health = 1000;
    hogger.ai_name = Some("boss_summoner".into());
    hogger.boss_id = Some(HOGGER_BOSS_ID);
    // Below the floor on purpose.
    hogger.respawn_delay_secs = 0;
    templates.insert(HOGGER, hogger);
    templates.insert(GNOLL, template(GNOLL, "Riverpaw Gnoll"));

    let mut wanderer = template(WANDERER, "Wandering Kobold");
    wanderer.ai_name = Some("wander".into());
    templates.insert(WANDERER, wanderer);

    let mut scripts = ScriptRegistry::with_builtin();
    scripts
        .register_summoner_boss("boss_summoner", GNOLL, Duration::from_secs(5))
        .unwrap();
    scripts
        .register_creature_ai("wander", move || {
            Box::new(WanderAI {
                calls: wander_calls.clone(),
            })
        })
        .unwrap();
    scripts
        .register_instance_script("sealed", || Box::new(SealedInstance))
        .unwrap();

    Arc::new(WorldContent { templates, scripts })
}

fn map_with(instance_script: Option<&str>) -> Map {
    let settings = MapSettings {
        instance_script: instance_script.map(str::to_string),
        ..MapSettings::default()
    };
    Map::new(MapId(0), settings, content(Arc::new(AtomicUsize::new(0))))
}

fn player(n: u64) -> ObjectGuid {
    ObjectGuid::new(HighGuid::Player, n)
}

fn add_player(map: &mut Map, n: u64, x: f32, faction: Faction) -> ObjectGuid {
    let guid = player(n);
    map.add_player(guid, &format!("Player{n}"), SessionId(n), Position::new(x, 0.0, 0.0), faction)
        .unwrap();
    guid
}

#[test]
fn engaging_is_symmetric_and_death_clears_both_sides() {
    let mut map = map_with(None);
    let hero = add_player(&mut map, 1, 0.0, Faction::Alliance);
    let kobold = map.spawn_creature(KOBOLD, Position::new(3.0, 0.0, 0.0)).unwrap();

    map.attack_start(hero, kobold).unwrap();
    assert!(map.combat().is_in_combat(hero));
    assert!(map.combat().is_in_combat(kobold));
    assert_eq!(map.combat().opponents(hero), vec![kobold]);
    assert_eq!(map.combat().opponents(kobold), vec![hero]);
    assert_eq!(map.threat(kobold).unwrap().current_target(), Some(hero));
    map.drain_notifications();

    map.kill(kobold, Some(hero)).unwrap();
    assert!(!map.combat().is_in_combat(hero));
    assert!(!map.combat().is_in_combat(kobold));
    assert_eq!(map.combat().reference_count(), 0);
    assert_eq!(map.unit(hero).unwrap().victim, None);

    let events: Vec<WorldEvent> = map.drain_notifications().into_iter().map(|n| n.event).collect();
    assert!(events.contains(&WorldEvent::AttackStopped {
        attacker: hero,
        victim: kobold,
        now_dead: true
    }));

    // Dead units cannot be killed twice or attacked.
    assert_eq!(map.kill(kobold, None), Err(MapError::Dead(kobold)));
    assert_eq!(map.attack_start(hero, kobold), Err(MapError::Dead(kobold)));
}

#[test]
fn friendly_targets_are_rejected() {
    let mut map = map_with(None);
    let hero = add_player(&mut map, 1, 0.0, Faction::Alliance);
    let ally = add_player(&mut map, 2, 1.0, Faction::Alliance);

    assert!(matches!(
        map.attack_start(hero, ally),
        Err(MapError::InvalidTarget { .. })
    ));
    assert!(matches!(
        map.attack_start(hero, hero),
        Err(MapError::InvalidTarget { .. })
    ));
    assert_eq!(map.combat().reference_count(), 0);
}

#[test]
fn feign_death_is_idempotent_and_the_creature_evades() {
    let mut map = map_with(None);
    let hero = add_player(&mut map, 1, 0.0, Faction::Alliance);
    let kobold = map.spawn_creature(KOBOLD, Position::new(3.0, 0.0, 0.0)).unwrap();
    map.attack_start(hero, kobold).unwrap();

    map.feign_death(hero).unwrap();
    assert!(!map.combat().is_in_combat(hero));
    assert!(map.combat().is_in_combat(kobold));
    assert!(map.combat().reference(hero, kobold).unwrap().is_suppressed_for(hero));
    assert!(map.threat(kobold).unwrap().is_empty());
    map.drain_notifications();

    // Nothing changes the second time, so nothing is reported.
    map.feign_death(hero).unwrap();
    assert!(map.drain_notifications().is_empty());
    assert!(!map.combat().is_in_combat(hero));

    // With nobody left on its threat list the creature gives up.
    map.update(Duration::from_millis(100));
    assert_eq!(map.combat().reference_count(), 0);
    assert!(!map.combat().is_in_combat(kobold));
}

#[test]
fn equal_threat_keeps_the_first_attacker() {
    let mut map = map_with(None);
    let first = add_player(&mut map, 1, 0.0, Faction::Alliance);
    let second = add_player(&mut map, 2, 1.0, Faction::Alliance);
    let kobold = map.spawn_creature(KOBOLD, Position::new(3.0, 0.0, 0.0)).unwrap();

    map.deal_damage(first, kobold, 10).unwrap();
    map.deal_damage(second, kobold, 10).unwrap();
    assert_eq!(map.threat(kobold).unwrap().current_target(), Some(first));

    map.deal_damage(second, kobold, 1).unwrap();
    assert_eq!(map.threat(kobold).unwrap().current_target(), Some(second));
    let order: Vec<ObjectGuid> = map
        .threat(kobold)
        .unwrap()
        .sorted_list()
        .iter()
        .map(|entry| entry.target)
        .collect();
    assert_eq!(order, vec![second, first]);
}

#[test]
fn pvp_combat_times_out_without_fresh_hits() {
    let mut map = map_with(None);
    let hero = add_player(&mut map, 1, 0.0, Faction::Alliance);
    let orc = add_player(&mut map, 2, 2.0, Faction::Horde);

    map.deal_damage(hero, orc, 10).unwrap();
    assert!(map.combat().reference(hero, orc).unwrap().is_pvp);

    map.update(Duration::from_secs(4));
    assert!(map.combat().is_engaged(hero, orc));

    // A new hit restarts the countdown.
    map.deal_damage(orc, hero, 10).unwrap();
    map.update(Duration::from_secs(4));
    assert!(map.combat().is_engaged(hero, orc));

    map.update(Duration::from_secs(1));
    assert!(!map.combat().is_engaged(hero, orc));
    assert!(!map.combat().is_in_combat(hero));
    assert!(!map.combat().is_in_combat(orc));
}

#[test]
fn crossing_a_cell_boundary_updates_the_object_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut map = Map::new(MapId(0), MapSettings::default(), content(calls.clone()));
    add_player(&mut map, 1, 60.0, Faction::Alliance);
    // Just west of the first boundary east of the origin.
    let wanderer = map.spawn_creature(WANDERER, Position::new(66.0, 0.0, 0.0)).unwrap();
    let before = map.partition().cell_of(wanderer).unwrap();
    assert_eq!(before, CellCoord::new(256, 256));

    map.update(Duration::from_secs(1));

    let after = map.partition().cell_of(wanderer).unwrap();
    assert_eq!(after, CellCoord::new(257, 256));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn inactive_cells_are_not_updated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut map = Map::new(MapId(0), MapSettings::default(), content(calls.clone()));
    add_player(&mut map, 1, 0.0, Faction::Alliance);
    map.spawn_creature(WANDERER, Position::new(1000.0, 0.0, 0.0)).unwrap();

    map.update(Duration::from_secs(1));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn boss_kill_completes_the_encounter_and_clears_the_attempt() {
    let mut map = map_with(Some("open_instance"));
    let hero = add_player(&mut map, 1, 0.0, Faction::Alliance);
    let boss = map.spawn_creature(HOGGER, Position::new(2.0, 0.0, 0.0)).unwrap();

    map.attack_start(hero, boss).unwrap();
    assert_eq!(map.encounter_state(HOGGER_BOSS_ID), EncounterState::InProgress);
    // The summon task.
    assert_eq!(map.pending_timers(), 1);

    map.update(Duration::from_secs(5));
    let summons: Vec<ObjectGuid> = map
        .unit(boss)
        .and_then(|unit| unit.boss.as_ref())
        .map(|behavior| behavior.summons.iter().copied().collect())
        .unwrap();
    assert_eq!(summons.len(), 1);
    let add = summons[0];
    assert!(map.combat().is_engaged(add, hero));

    map.kill(boss, Some(hero)).unwrap();
    assert_eq!(map.encounter_state(HOGGER_BOSS_ID), EncounterState::Done);
    assert!(map.object(add).is_none());
    assert!(!map.combat().is_in_combat(hero));
    // Only the corpse timer is left; the next summon was cancelled.
    assert_eq!(map.pending_timers(), 1);

    let events: Vec<WorldEvent> = map.drain_notifications().into_iter().map(|n| n.event).collect();
    assert!(events.contains(&WorldEvent::EncounterStateChanged {
        boss_id: HOGGER_BOSS_ID,
        state: EncounterState::Done
    }));

    assert_eq!(map.reset_encounter(HOGGER_BOSS_ID), EncounterState::Done);
    assert_eq!(map.encounter_state(HOGGER_BOSS_ID), EncounterState::NotStarted);
}

#[test]
fn wipe_fails_the_encounter_and_the_boss_respawns_after_the_floor() {
    let mut map = map_with(Some("open_instance"));
    let hero = add_player(&mut map, 1, 0.0, Faction::Alliance);
    let boss = map.spawn_creature(HOGGER, Position::new(2.0, 0.0, 0.0)).unwrap();
    map.attack_start(hero, boss).unwrap();
    assert_eq!(map.encounter_state(HOGGER_BOSS_ID), EncounterState::InProgress);

    map.remove_object(hero).unwrap();
    assert_eq!(map.encounter_state(HOGGER_BOSS_ID), EncounterState::Fail);
    assert!(map.object(boss).is_none());
    // The respawn timer survives, the summon task does not.
    assert_eq!(map.pending_timers(), 1);

    map.update(MIN_RESPAWN_DELAY - Duration::from_millis(1));
    assert!(map.object(boss).is_none());
    assert_eq!(map.encounter_state(HOGGER_BOSS_ID), EncounterState::Fail);

    map.update(Duration::from_millis(1));
    assert!(map.object(boss).is_some());
    assert_eq!(map.encounter_state(HOGGER_BOSS_ID), EncounterState::NotStarted);
    assert_eq!(map.pending_timers(), 0);
}

#[test]
fn refused_engage_makes_the_boss_evade() {
    let mut map = map_with(Some("sealed"));
    let hero = add_player(&mut map, 1, 0.0, Faction::Alliance);
    let boss = map.spawn_creature(HOGGER, Position::new(2.0, 0.0, 0.0)).unwrap();

    map.attack_start(hero, boss).unwrap();
    assert_eq!(map.encounter_state(HOGGER_BOSS_ID), EncounterState::NotStarted);
    assert!(!map.combat().is_in_combat(boss));
    assert!(!map.combat().is_in_combat(hero));
    assert!(map.object(boss).is_some());
    assert_eq!(map.pending_timers(), 0);
}

#[test]
fn duel_ends_at_one_health() {
    let mut map = map_with(None);
    let challenger = add_player(&mut map, 1, 0.0, Faction::Alliance);
    let rival = add_player(&mut map, 2, 3.0, Faction::Alliance);

    map.propose_duel(challenger, rival).unwrap();
    map.respond_duel(rival, challenger, true).unwrap();
    assert_eq!(map.unit(challenger).unwrap().duel_opponent, Some(rival));
    assert!(map.combat().reference(challenger, rival).unwrap().is_pvp);

    map.deal_damage(challenger, rival, 10_000).unwrap();
    assert_eq!(map.unit(rival).unwrap().health, 1);
    assert_eq!(map.unit(rival).unwrap().duel_opponent, None);
    assert!(!map.combat().is_engaged(challenger, rival));

    let events: Vec<WorldEvent> = map.drain_notifications().into_iter().map(|n| n.event).collect();
    assert!(events.contains(&WorldEvent::DuelFinished {
        initiator: challenger,
        target: rival,
        outcome: DuelOutcome::Won
    }));

    // Back to being friends.
    assert!(map.deal_damage(challenger, rival, 1).is_err());
}

#[test]
fn unanswered_duel_expires() {
    let mut map = map_with(None);
    let challenger = add_player(&mut map, 1, 0.0, Faction::Alliance);
    let rival = add_player(&mut map, 2, 3.0, Faction::Alliance);
    map.propose_duel(challenger, rival).unwrap();
    assert!(map.propose_duel(challenger, rival).is_err());
    map.drain_notifications();

    map.update(DUEL_REQUEST_TIMEOUT);
    let events: Vec<WorldEvent> = map.drain_notifications().into_iter().map(|n| n.event).collect();
    assert!(events.contains(&WorldEvent::DuelFinished {
        initiator: challenger,
        target: rival,
        outcome: DuelOutcome::Expired
    }));
    assert_eq!(
        map.respond_duel(rival, challenger, true),
        Err(MapError::NoPendingDuel {
            initiator: challenger,
            target: rival
        })
    );
}

#[test]
fn session_timers_go_with_the_session_and_world_timers_stay() {
    let mut map = map_with(None);
    let challenger = add_player(&mut map, 1, 0.0, Faction::Alliance);
    let rival = add_player(&mut map, 2, 3.0, Faction::Alliance);
    let kobold = map.spawn_creature(KOBOLD, Position::new(5.0, 0.0, 0.0)).unwrap();

    map.kill(kobold, Some(challenger)).unwrap();
    map.propose_duel(challenger, rival).unwrap();
    assert_eq!(map.pending_timers(), 2);

    assert_eq!(map.cancel_session_timers(SessionId(1)), 1);
    assert_eq!(map.pending_timers(), 1);
    assert!(map.respond_duel(rival, challenger, true).is_err());

    // The corpse still decays on schedule.
    map.update(world_sim::CORPSE_DECAY);
    assert!(map.object(kobold).is_none());
    assert_eq!(map.pending_timers(), 0);
}
