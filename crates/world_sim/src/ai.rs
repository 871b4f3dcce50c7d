//! Creature AI surface.
//!
//! AIs never touch the map. Each callback receives a read-only
//! [`AiContext`] describing the unit and its surroundings and answers with a
//! list of [`AiAction`] requests that the map then validates and applies.

use std::time::Duration;

use crate::object::MELEE_RANGE;
use crate::types::{ObjectGuid, Position};

/// A request from an AI to the map.
#[derive(Debug, Clone, PartialEq)]
pub enum AiAction {
    /// Start attacking (and engage) `target`.
    Attack(ObjectGuid),
    StopAttack,
    MoveTo(Position),
    Summon { entry: u32, position: Position },
    /// Call back `on_scheduled_task(task_id)` after `delay`.
    ScheduleTask { delay: Duration, task_id: u32 },
    /// Drop all combat, return home and reset.
    Evade,
    Despawn,
    Emote(u32),
}

/// Snapshot of what an AI may look at, built by the map before each call.
#[derive(Debug, Clone, PartialEq)]
pub struct AiContext {
    pub me: ObjectGuid,
    pub position: Position,
    pub home: Position,
    pub health_pct: f32,
    pub in_combat: bool,
    pub victim: Option<ObjectGuid>,
    /// Current threat target and its position.
    pub threat_target: Option<(ObjectGuid, Position)>,
    /// Alive hostile player-controlled units within aggro radius, nearest first.
    pub hostiles_in_range: Vec<(ObjectGuid, Position)>,
}

/// Behaviour attached to a creature.
pub trait UnitAI: Send {
    fn name(&self) -> &'static str;

    /// Called every tick while the unit's cell is active.
    fn update_ai(&mut self, ctx: &AiContext, diff: Duration) -> Vec<AiAction>;

    fn just_engaged_with(&mut self, _ctx: &AiContext, _who: ObjectGuid) -> Vec<AiAction> {
        Vec::new()
    }

    fn just_entered_combat(&mut self, _ctx: &AiContext) -> Vec<AiAction> {
        Vec::new()
    }

    fn just_exited_combat(&mut self, _ctx: &AiContext) -> Vec<AiAction> {
        Vec::new()
    }

    fn just_died(&mut self, _ctx: &AiContext, _killer: Option<ObjectGuid>) -> Vec<AiAction> {
        Vec::new()
    }

    fn just_summoned(&mut self, _ctx: &AiContext, _summon: ObjectGuid) -> Vec<AiAction> {
        Vec::new()
    }

    fn on_scheduled_task(&mut self, _ctx: &AiContext, _task_id: u32) -> Vec<AiAction> {
        Vec::new()
    }

    fn enter_evade_mode(&mut self, _ctx: &AiContext) -> Vec<AiAction> {
        Vec::new()
    }
}

/// Default creature control: aggro on nearby hostiles, chase the threat
/// target, evade once nothing is left on the threat list.
#[derive(Debug, Default, Clone)]
pub struct AggressorAI;

impl UnitAI for AggressorAI {
    fn name(&self) -> &'static str {
        "aggressor"
    }

    fn update_ai(&mut self, ctx: &AiContext, _diff: Duration) -> Vec<AiAction> {
        if let Some((target, target_pos)) = ctx.threat_target {
            let mut actions = Vec::new();
            if ctx.victim != Some(target) {
                actions.push(AiAction::Attack(target));
            }
            if ctx.position.distance_2d(&target_pos) > MELEE_RANGE {
                actions.push(AiAction::MoveTo(target_pos));
            }
            return actions;
        }
        if ctx.in_combat {
            return vec![AiAction::Evade];
        }
        match ctx.hostiles_in_range.first() {
            Some((target, _)) => vec![AiAction::Attack(*target)],
            None => Vec::new(),
        }
    }
}

/// Never initiates combat; fights back only through threat.
#[derive(Debug, Default, Clone)]
pub struct PassiveAI;

impl UnitAI for PassiveAI {
    fn name(&self) -> &'static str {
        "passive"
    }

    fn update_ai(&mut self, ctx: &AiContext, diff: Duration) -> Vec<AiAction> {
        if ctx.threat_target.is_none() && !ctx.in_combat {
            return Vec::new();
        }
        AggressorAI.update_ai(ctx, diff)
    }
}

/// Boss that periodically calls in adds while engaged.
#[derive(Debug, Clone)]
pub struct SummonerBossAI {
    inner: AggressorAI,
    add_entry: u32,
    interval: Duration,
}

impl SummonerBossAI {
    pub const TASK_SUMMON_ADDS: u32 = 1;

    pub fn new(add_entry: u32, interval: Duration) -> Self {
        Self {
            inner: AggressorAI,
            add_entry,
            interval,
        }
    }
}

impl UnitAI for SummonerBossAI {
    fn name(&self) -> &'static str {
        "boss_summoner"
    }

    fn update_ai(&mut self, ctx: &AiContext, diff: Duration) -> Vec<AiAction> {
        self.inner.update_ai(ctx, diff)
    }

    fn just_entered_combat(&mut self, _ctx: &AiContext) -> Vec<AiAction> {
        vec![AiAction::ScheduleTask {
            delay: self.interval,
            task_id: Self::TASK_SUMMON_ADDS,
        }]
    }

    fn on_scheduled_task(&mut self, ctx: &AiContext, task_id: u32) -> Vec<AiAction> {
        if task_id != Self::TASK_SUMMON_ADDS {
            return Vec::new();
        }
        let mut spot = ctx.position;
        spot.x += 3.0;
        vec![
            AiAction::Summon {
                entry: self.add_entry,
                position: spot,
            },
            AiAction::ScheduleTask {
                delay: self.interval,
                task_id: Self::TASK_SUMMON_ADDS,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HighGuid;

    fn ctx() -> AiContext {
        AiContext {
            me: ObjectGuid::new(HighGuid::Creature, 1),
            position: Position::new(0.0, 0.0, 0.0),
            home: Position::new(0.0, 0.0, 0.0),
            health_pct: 100.0,
            in_combat: false,
            victim: None,
            threat_target: None,
            hostiles_in_range: Vec::new(),
        }
    }

    #[test]
    fn aggressor_picks_nearest_hostile_then_chases() {
        let hero = ObjectGuid::new(HighGuid::Player, 1);
        let mut ai = AggressorAI;
        let mut view = ctx();
        assert!(ai.update_ai(&view, Duration::ZERO).is_empty());

        view.hostiles_in_range = vec![(hero, Position::new(15.0, 0.0, 0.0))];
        assert_eq!(ai.update_ai(&view, Duration::ZERO), vec![AiAction::Attack(hero)]);

        view.in_combat = true;
        view.threat_target = Some((hero, Position::new(15.0, 0.0, 0.0)));
        view.victim = Some(hero);
        assert_eq!(
            ai.update_ai(&view, Duration::ZERO),
            vec![AiAction::MoveTo(Position::new(15.0, 0.0, 0.0))]
        );

        view.threat_target = None;
        assert_eq!(ai.update_ai(&view, Duration::ZERO), vec![AiAction::Evade]);
    }

    #[test]
    fn passive_ignores_hostiles() {
        let mut view = ctx();
        view.hostiles_in_range = vec![(ObjectGuid::new(HighGuid::Player, 1), Position::default())];
        assert!(PassiveAI.update_ai(&view, Duration::ZERO).is_empty());
    }

    #[test]
    fn summoner_reschedules_itself() {
        let mut boss = SummonerBossAI::new(77, Duration::from_secs(10));
        let view = ctx();
        assert_eq!(
            boss.just_entered_combat(&view),
            vec![AiAction::ScheduleTask {
                delay: Duration::from_secs(10),
                task_id: SummonerBossAI::TASK_SUMMON_ADDS
            }]
        );
        let actions = boss.on_scheduled_task(&view, SummonerBossAI::TASK_SUMMON_ADDS);
        assert!(matches!(actions[0], AiAction::Summon { entry: 77, .. }));
        assert!(boss.on_scheduled_task(&view, 99).is_empty());
    }
}
