//! Explicit registry of creature AIs and instance scripts.
//!
//! Scripts are looked up by the names used in creature templates and map
//! configuration. Everything is registered at startup; there is no global
//! registry and no runtime discovery.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::ai::{AggressorAI, PassiveAI, SummonerBossAI, UnitAI};
use crate::encounter::InstanceScript;
use crate::error::ScriptError;

type AiFactory = Box<dyn Fn() -> Box<dyn UnitAI> + Send + Sync>;
type InstanceFactory = Box<dyn Fn() -> Box<dyn InstanceScript> + Send + Sync>;

/// Name of the AI used when a template names none.
pub const DEFAULT_CREATURE_AI: &str = "aggressor";

#[derive(Default)]
pub struct ScriptRegistry {
    creature_ai: HashMap<String, AiFactory>,
    instances: HashMap<String, InstanceFactory>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in AIs and the open-door instance
    /// script.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        // Names are fixed and distinct, registration cannot collide here.
        let _ = registry.register_creature_ai(DEFAULT_CREATURE_AI, || Box::new(AggressorAI));
        let _ = registry.register_creature_ai("passive", || Box::new(PassiveAI));
        let _ = registry.register_instance_script("open_instance", || Box::new(OpenInstance));
        registry
    }

    /// Registers a [`SummonerBossAI`] under `name` that calls in `add_entry`
    /// every `interval`.
    pub fn register_summoner_boss(
        &mut self,
        name: &str,
        add_entry: u32,
        interval: Duration,
    ) -> Result<(), ScriptError> {
        self.register_creature_ai(name, move || Box::new(SummonerBossAI::new(add_entry, interval)))
    }

    pub fn register_creature_ai<F>(&mut self, name: &str, factory: F) -> Result<(), ScriptError>
    where
        F: Fn() -> Box<dyn UnitAI> + Send + Sync + 'static,
    {
        if self.creature_ai.contains_key(name) {
            return Err(ScriptError::Duplicate(name.to_string()));
        }
        debug!(script = name, "Registered creature AI");
        self.creature_ai.insert(name.to_string(), Box::new(factory));
        Ok(())
    }

    pub fn register_instance_script<F>(&mut self, name: &str, factory: F) -> Result<(), ScriptError>
    where
        F: Fn() -> Box<dyn InstanceScript> + Send + Sync + 'static,
    {
        if self.instances.contains_key(name) {
            return Err(ScriptError::Duplicate(name.to_string()));
        }
        debug!(script = name, "Registered instance script");
        self.instances.insert(name.to_string(), Box::new(factory));
        Ok(())
    }

    pub fn create_ai(&self, name: &str) -> Option<Box<dyn UnitAI>> {
        self.creature_ai.get(name).map(|factory| factory())
    }

    pub fn create_instance_script(&self, name: &str) -> Option<Box<dyn InstanceScript>> {
        self.instances.get(name).map(|factory| factory())
    }

    pub fn has_creature_ai(&self, name: &str) -> bool {
        self.creature_ai.contains_key(name)
    }

    pub fn has_instance_script(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }
}

impl std::fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ai: Vec<&String> = self.creature_ai.keys().collect();
        ai.sort();
        let mut instances: Vec<&String> = self.instances.keys().collect();
        instances.sort();
        f.debug_struct("ScriptRegistry")
            .field("creature_ai", &ai)
            .field("instances", &instances)
            .finish()
    }
}

/// Instance script that accepts every engage and only observes.
#[derive(Debug, Default)]
pub struct OpenInstance;

impl InstanceScript for OpenInstance {
    fn name(&self) -> &'static str {
        "open_instance"
    }
}
