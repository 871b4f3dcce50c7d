//! World objects and the unit component.
//!
//! Every object has an identity, a kind and a position. Players and
//! creatures additionally carry a [`Unit`] with health, threat and an
//! optional AI; game objects and area triggers do not.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ai::UnitAI;
use crate::encounter::BossBehavior;
use crate::threat::ThreatManager;
use crate::types::{MapId, ObjectGuid, Position, SessionId};

/// Distance within which a unit can land melee swings.
pub const MELEE_RANGE: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Player,
    Creature,
    GameObject,
    AreaTrigger,
}

/// Faction groups used for hostility checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Faction {
    Alliance,
    Horde,
    #[default]
    Monster,
    Friendly,
}

impl Faction {
    pub fn is_hostile_to(self, other: Faction) -> bool {
        use Faction::*;
        matches!(
            (self, other),
            (Alliance, Horde) | (Horde, Alliance) | (Monster, Alliance) | (Monster, Horde)
                | (Alliance, Monster) | (Horde, Monster)
        )
    }
}

/// Static data a creature is spawned from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatureTemplate {
    pub entry: u32,
    pub name: String,
    #[serde(default = "default_max_health")]
    pub max_health: u32,
    #[serde(default)]
    pub faction: Faction,
    #[serde(default = "default_min_damage")]
    pub min_damage: u32,
    #[serde(default = "default_max_damage")]
    pub max_damage: u32,
    /// Milliseconds between melee swings.
    #[serde(default = "default_attack_time")]
    pub attack_time_ms: u32,
    #[serde(default = "default_aggro_radius")]
    pub aggro_radius: f32,
    /// Name of a registered creature AI. `None` uses the default aggressor.
    #[serde(default)]
    pub ai_name: Option<String>,
    /// Set for encounter bosses.
    #[serde(default)]
    pub boss_id: Option<u32>,
    #[serde(default = "default_respawn_secs")]
    pub respawn_delay_secs: u64,
}

fn default_max_health() -> u32 {
    100
}

fn default_min_damage() -> u32 {
    5
}

fn default_max_damage() -> u32 {
    10
}

fn default_attack_time() -> u32 {
    2000
}

fn default_aggro_radius() -> f32 {
    20.0
}

fn default_respawn_secs() -> u64 {
    30
}

/// Combat-capable part of players and creatures.
pub struct Unit {
    pub health: u32,
    pub max_health: u32,
    pub faction: Faction,
    pub min_damage: u32,
    pub max_damage: u32,
    pub attack_interval: Duration,
    /// Time left until the next swing is ready.
    pub attack_timer: Duration,
    pub aggro_radius: f32,
    pub victim: Option<ObjectGuid>,
    pub home: Position,
    pub threat: ThreatManager,
    pub ai: Option<Box<dyn UnitAI>>,
    pub boss: Option<BossBehavior>,
    /// Owning session for player-controlled units.
    pub session: Option<SessionId>,
    /// Opponent of an accepted duel.
    pub duel_opponent: Option<ObjectGuid>,
    /// Set by summons: the boss that created this unit.
    pub summoner: Option<ObjectGuid>,
}

impl Unit {
    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn is_player_controlled(&self) -> bool {
        self.session.is_some()
    }

    pub fn health_pct(&self) -> f32 {
        if self.max_health == 0 {
            return 0.0;
        }
        self.health as f32 * 100.0 / self.max_health as f32
    }

    /// Damage of one swing: the midpoint of the damage range.
    pub fn swing_damage(&self) -> u32 {
        (self.min_damage + self.max_damage.max(self.min_damage)) / 2
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("health", &self.health)
            .field("max_health", &self.max_health)
            .field("faction", &self.faction)
            .field("victim", &self.victim)
            .field("threat", &self.threat)
            .field("ai", &self.ai.as_ref().map(|ai| ai.name()))
            .field("boss", &self.boss)
            .field("session", &self.session)
            .finish()
    }
}

/// An object placed on a map.
#[derive(Debug)]
pub struct WorldObject {
    pub guid: ObjectGuid,
    pub kind: ObjectKind,
    pub name: String,
    pub map_id: MapId,
    pub position: Position,
    /// Template entry for creatures.
    pub entry: Option<u32>,
    pub unit: Option<Unit>,
}

impl WorldObject {
    pub fn player(
        guid: ObjectGuid,
        name: impl Into<String>,
        map_id: MapId,
        position: Position,
        session: SessionId,
        faction: Faction,
    ) -> Self {
        Self {
            guid,
            kind: ObjectKind::Player,
            name: name.into(),
            map_id,
            position,
            entry: None,
            unit: Some(Unit {
                health: 250,
                max_health: 250,
                faction,
                min_damage: 15,
                max_damage: 25,
                attack_interval: Duration::from_millis(2000),
                attack_timer: Duration::ZERO,
                aggro_radius: 0.0,
                victim: None,
                home: position,
                threat: ThreatManager::new(),
                ai: None,
                boss: None,
                session: Some(session),
                duel_opponent: None,
                summoner: None,
            }),
        }
    }

    pub fn creature(
        guid: ObjectGuid,
        template: &CreatureTemplate,
        map_id: MapId,
        position: Position,
        ai: Option<Box<dyn UnitAI>>,
    ) -> Self {
        let boss = template
            .boss_id
            .map(|boss_id| BossBehavior::new(boss_id, Duration::from_secs(template.respawn_delay_secs)));
        Self {
            guid,
            kind: ObjectKind::Creature,
            name: template.name.clone(),
            map_id,
            position,
            entry: Some(template.entry),
            unit: Some(Unit {
                health: template.max_health,
                max_health: template.max_health,
                faction: template.faction,
                min_damage: template.min_damage,
                max_damage: template.max_damage,
                attack_interval: Duration::from_millis(u64::from(template.attack_time_ms)),
                attack_timer: Duration::ZERO,
                aggro_radius: template.aggro_radius,
                victim: None,
                home: position,
                threat: ThreatManager::new(),
                ai,
                boss,
                session: None,
                duel_opponent: None,
                summoner: None,
            }),
        }
    }

    /// Game objects and area triggers: positioned, never in combat.
    pub fn plain(guid: ObjectGuid, kind: ObjectKind, name: impl Into<String>, map_id: MapId, position: Position) -> Self {
        Self {
            guid,
            kind,
            name: name.into(),
            map_id,
            position,
            entry: None,
            unit: None,
        }
    }

    pub fn is_unit(&self) -> bool {
        self.unit.is_some()
    }

    pub fn is_player_controlled(&self) -> bool {
        self.unit.as_ref().is_some_and(Unit::is_player_controlled)
    }

    pub fn session(&self) -> Option<SessionId> {
        self.unit.as_ref().and_then(|unit| unit.session)
    }

    pub fn is_alive(&self) -> bool {
        self.unit.as_ref().is_some_and(Unit::is_alive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostility_matrix() {
        assert!(Faction::Monster.is_hostile_to(Faction::Alliance));
        assert!(Faction::Horde.is_hostile_to(Faction::Alliance));
        assert!(!Faction::Alliance.is_hostile_to(Faction::Alliance));
        assert!(!Faction::Monster.is_hostile_to(Faction::Monster));
        assert!(!Faction::Friendly.is_hostile_to(Faction::Horde));
    }

    #[test]
    fn players_carry_their_session() {
        let guid = ObjectGuid::new(crate::types::HighGuid::Player, 1);
        let mut player = WorldObject::player(
            guid,
            "Anduin",
            MapId(0),
            Position::new(1.0, 2.0, 3.0),
            SessionId(9),
            Faction::Alliance,
        );
        assert!(player.is_player_controlled());
        assert_eq!(player.session(), Some(SessionId(9)));
        let unit = player.unit.as_mut().unwrap();
        assert_eq!(unit.swing_damage(), 20);
        unit.health = 0;
        assert!(!player.is_alive());
    }
}
