//! # World Simulation
//!
//! Map-level simulation for the realm world server. Everything here is
//! single-threaded per map and knows nothing about sockets or packets: the
//! server layer feeds requests in through [`Map`] methods and collects the
//! resulting [`Notification`]s once per tick.
//!
//! ## Modules
//!
//! - [`grid`] - Cell geometry and the spatial partition that decides which
//!   objects are updated
//! - [`combat`] - Symmetric combat references between units
//! - [`threat`] - Per-creature threat lists and target selection
//! - [`encounter`] - Boss encounter states and instance script hooks
//! - [`scheduler`] - Owner-tagged, cancellable timers driven by the tick
//! - [`ai`] / [`scripts`] - Creature behaviour and the name registry it is
//!   looked up in
//! - [`map`] - The [`Map`] that ties all of the above together

pub mod ai;
pub mod combat;
pub mod encounter;
pub mod error;
pub mod events;
pub mod grid;
pub mod map;
pub mod object;
pub mod scheduler;
pub mod scripts;
pub mod shutdown;
pub mod threat;
pub mod types;

pub use ai::{AggressorAI, AiAction, AiContext, PassiveAI, SummonerBossAI, UnitAI};
pub use combat::{CombatGraph, CombatManager, CombatNotification, CombatPair, CombatReference, PVP_COMBAT_TIMEOUT};
pub use encounter::{BossBehavior, EncounterState, EncounterTracker, InstanceScript, MIN_RESPAWN_DELAY};
pub use error::{EncounterError, MapError, ScriptError};
pub use events::{DuelOutcome, Notification, WorldEvent};
pub use grid::{CellCoord, Relocation, SpatialPartition};
pub use map::{Map, MapSettings, WorldContent, CORPSE_DECAY, DUEL_REQUEST_TIMEOUT, RUN_SPEED};
pub use object::{CreatureTemplate, Faction, ObjectKind, Unit, WorldObject, MELEE_RANGE};
pub use scheduler::{Scheduler, TimerOwner, TimerToken};
pub use scripts::{OpenInstance, ScriptRegistry, DEFAULT_CREATURE_AI};
pub use shutdown::{ShutdownPhase, ShutdownState};
pub use threat::{ThreatEntry, ThreatManager};
pub use types::{HighGuid, MapId, ObjectGuid, Position, SessionId};
