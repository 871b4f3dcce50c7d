//! The simulation side of the server.
//!
//! [`World`] owns every map plus the session to character bindings and is
//! the context packet handlers run against. It is only ever touched by the
//! [`WorldRunner`], so nothing in here needs locking; maps are handed to
//! rayon workers one per thread during a tick and never shared.

pub mod runner;

pub use runner::{WorldCommand, WorldRunner, INBOUND_QUEUE_DEPTH};

use crate::config::WorldConfig;
use crate::connection::SessionManager;
use crate::error::ServerError;
use crate::messaging::route_notifications;
use rayon::prelude::*;
use rayon::ThreadPool;
use realm_protocol::packets::{ConnectTo, LoginVerifyWorld, LogoutComplete};
use realm_protocol::{encode_packet, HandlerFault, ServerPacket};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use world_sim::{
    Faction, HighGuid, Map, MapId, MapSettings, ObjectGuid, Position, ScriptRegistry, SessionId, WorldContent,
};

/// The character a session controls and the map it is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerRecord {
    pub guid: ObjectGuid,
    pub map: MapId,
}

/// All maps of this server plus who is playing on them.
pub struct World {
    maps: BTreeMap<MapId, Map>,
    sessions: Arc<SessionManager>,
    players: HashMap<SessionId, PlayerRecord>,
    start_map: MapId,
    start_position: Position,
    player_faction: Faction,
    instance_port: u16,
}

impl World {
    /// Builds the maps described by `config` and places their spawns.
    ///
    /// # Arguments
    ///
    /// * `config` - Maps, creature templates and spawns
    /// * `scripts` - Registry AI and instance script names are resolved in
    /// * `sessions` - Registry notifications are delivered through
    /// * `instance_port` - Port advertised to clients in `SMSG_CONNECT_TO`
    ///
    /// # Returns
    ///
    /// `ServerError::Config` if the start map is missing or a spawn refers
    /// to an unknown map or template.
    pub fn new(
        config: &WorldConfig,
        scripts: ScriptRegistry,
        sessions: Arc<SessionManager>,
        instance_port: u16,
    ) -> Result<Self, ServerError> {
        let templates = config
            .templates
            .iter()
            .map(|template| (template.entry, template.clone()))
            .collect();
        let content = Arc::new(WorldContent { templates, scripts });

        let mut maps = BTreeMap::new();
        for map in &config.maps {
            let id = MapId(map.id);
            let settings = MapSettings {
                activation_radius: map.activation_radius,
                visibility_distance: map.visibility_distance,
                instance_script: map.instance_script.clone(),
            };
            if maps.insert(id, Map::new(id, settings, Arc::clone(&content))).is_some() {
                return Err(ServerError::Config(format!("{id} is configured twice")));
            }
        }

        let start_map = MapId(config.start.map);
        if !maps.contains_key(&start_map) {
            return Err(ServerError::Config(format!("start location is on unknown {start_map}")));
        }
        if !config.start.position.is_finite() {
            return Err(ServerError::Config("start position is not finite".to_string()));
        }

        for spawn in &config.spawns {
            let map = maps
                .get_mut(&MapId(spawn.map))
                .ok_or_else(|| ServerError::Config(format!("spawn of entry {} on unknown map {}", spawn.entry, spawn.map)))?;
            map.spawn_creature(spawn.entry, spawn.position)
                .map_err(|e| ServerError::Config(format!("spawn of entry {} failed: {e}", spawn.entry)))?;
        }

        let mut world = Self {
            maps,
            sessions,
            players: HashMap::new(),
            start_map,
            start_position: config.start.position,
            player_faction: config.player_faction,
            instance_port,
        };
        // Nobody is online yet, spawn notifications have no audience.
        for map in world.maps.values_mut() {
            map.drain_notifications();
        }
        info!(
            "🌍 World ready: {} map(s), {} creature template(s), {} spawn(s)",
            world.maps.len(),
            config.templates.len(),
            config.spawns.len()
        );
        Ok(world)
    }

    pub fn map(&self, id: MapId) -> Option<&Map> {
        self.maps.get(&id)
    }

    pub fn map_mut(&mut self, id: MapId) -> Option<&mut Map> {
        self.maps.get_mut(&id)
    }

    pub fn map_count(&self) -> usize {
        self.maps.len()
    }

    pub fn player(&self, session: SessionId) -> Option<PlayerRecord> {
        self.players.get(&session).copied()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Sends a packet to one session outside of the notification flow.
    pub fn send_to<P: ServerPacket>(&self, session: SessionId, packet: &P) -> Result<(), HandlerFault> {
        let frame = encode_packet(packet).map_err(|e| HandlerFault::new(e.to_string()))?;
        self.sessions
            .send(session, frame)
            .map_err(|e| HandlerFault::new(e.to_string()))
    }

    /// Places the session's character in the start map and begins the
    /// instance connection handshake.
    ///
    /// `SMSG_LOGIN_VERIFY_WORLD` travels on the instance connection, so it
    /// waits in the session's pending queue until the client answers
    /// `SMSG_CONNECT_TO`.
    pub fn login(&mut self, session: SessionId, character: u64) -> Result<ObjectGuid, HandlerFault> {
        if self.players.contains_key(&session) {
            return Err(HandlerFault::new("already logged in"));
        }
        let guid = ObjectGuid::new(HighGuid::Player, character);
        if guid.is_empty() {
            return Err(HandlerFault::new("character 0 does not exist"));
        }
        if self.players.values().any(|record| record.guid == guid) {
            return Err(HandlerFault::new(format!("{guid} is already online")));
        }
        let name = self
            .sessions
            .get(session)
            .ok_or_else(|| HandlerFault::new("session is gone"))?
            .account()
            .account_name
            .clone();

        let map = self
            .maps
            .get_mut(&self.start_map)
            .ok_or_else(|| HandlerFault::new("start map is missing"))?;
        map.add_player(guid, &name, session, self.start_position, self.player_faction)
            .map_err(|e| HandlerFault::new(e.to_string()))?;
        self.players.insert(
            session,
            PlayerRecord {
                guid,
                map: self.start_map,
            },
        );

        let (key, serial) = self.sessions.issue_connect_key(session);
        self.send_to(
            session,
            &ConnectTo {
                key,
                serial,
                port: self.instance_port,
            },
        )?;
        let position = self.start_position;
        self.send_to(
            session,
            &LoginVerifyWorld {
                guid: guid.raw(),
                map_id: self.start_map.0,
                x: position.x,
                y: position.y,
                z: position.z,
                orientation: position.orientation,
            },
        )?;
        Ok(guid)
    }

    /// Takes the session's character out of the world and closes its
    /// instance connection. The realm connection stays up.
    pub fn logout(&mut self, session: SessionId) -> Result<(), HandlerFault> {
        if self.remove_player(session).is_none() {
            return Err(HandlerFault::new("not logged in"));
        }
        self.send_to(session, &LogoutComplete)?;
        // Hand over the removal notices before the instance socket goes.
        self.flush();
        if let Some(handle) = self.sessions.get(session) {
            handle.detach(realm_protocol::ConnectionType::Instance);
        }
        Ok(())
    }

    /// Cleans up after a session whose realm connection ended.
    ///
    /// Removing the character cancels its session-owned timers; world and
    /// unit timers on the same map keep running.
    pub fn disconnect(&mut self, session: SessionId) {
        if let Some(record) = self.remove_player(session) {
            info!("👋 {} left, {} removed from {}", session, record.guid, record.map);
        }
        // Timers can outlive the character if it already left the map.
        for map in self.maps.values_mut() {
            let cancelled = map.cancel_session_timers(session);
            if cancelled > 0 {
                debug!(map = %map.id(), %session, cancelled, "Cancelled session timers");
            }
        }
    }

    fn remove_player(&mut self, session: SessionId) -> Option<PlayerRecord> {
        let record = self.players.remove(&session)?;
        if let Some(map) = self.maps.get_mut(&record.map) {
            if let Err(e) = map.remove_object(record.guid) {
                warn!(%session, "Character was already gone from its map: {}", e);
            }
        }
        Some(record)
    }

    /// The map and character a handler acts on for `session`.
    pub fn player_map(&mut self, session: SessionId) -> Result<(&mut Map, ObjectGuid), HandlerFault> {
        let record = self
            .players
            .get(&session)
            .copied()
            .ok_or_else(|| HandlerFault::new("not in world"))?;
        let map = self
            .maps
            .get_mut(&record.map)
            .ok_or_else(|| HandlerFault::new(format!("{} is missing", record.map)))?;
        Ok((map, record.guid))
    }

    /// Advances every map by `diff`. Each map is updated by exactly one
    /// thread; with a pool, different maps run in parallel.
    pub fn update(&mut self, diff: Duration, pool: Option<&ThreadPool>) {
        match pool {
            Some(pool) => pool.install(|| {
                self.maps.par_iter_mut().for_each(|(_, map)| map.update(diff));
            }),
            None => {
                for map in self.maps.values_mut() {
                    map.update(diff);
                }
            }
        }
    }

    /// Delivers what the maps recorded since the last flush.
    pub fn flush(&mut self) -> usize {
        let mut delivered = 0;
        for map in self.maps.values_mut() {
            let notifications = map.drain_notifications();
            if !notifications.is_empty() {
                delivered += route_notifications(notifications, &self.sessions);
            }
        }
        delivered
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("maps", &self.maps.keys().collect::<Vec<_>>())
            .field("players", &self.players.len())
            .field("start_map", &self.start_map)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::AccountInfo;
    use realm_protocol::packets::{ConnectTo, LoginVerifyWorld};
    use realm_protocol::{decode_response, smsg, ConnectionType, Locale};
    use tokio::sync::mpsc;

    fn world() -> (World, Arc<SessionManager>) {
        let sessions = Arc::new(SessionManager::new(64));
        let world = World::new(
            &WorldConfig::default(),
            ScriptRegistry::with_builtin(),
            Arc::clone(&sessions),
            8086,
        )
        .unwrap();
        (world, sessions)
    }

    fn connect(sessions: &SessionManager, name: &str) -> (SessionId, mpsc::Receiver<realm_protocol::EncodedFrame>) {
        let session = sessions.create_session(
            AccountInfo {
                account_id: 1,
                account_name: name.to_string(),
                build: 1,
                locale: Locale::EnUs,
            },
            "127.0.0.1:40000".parse().unwrap(),
        );
        let (tx, rx) = mpsc::channel(64);
        session.attach(ConnectionType::Realm, tx).unwrap();
        (session.id(), rx)
    }

    #[test]
    fn default_world_places_its_spawn() {
        let (world, _) = world();
        assert_eq!(world.map_count(), 1);
        assert_eq!(world.map(MapId(0)).unwrap().len(), 1);
    }

    #[test]
    fn unknown_start_map_is_a_config_error() {
        let mut config = WorldConfig::default();
        config.start.map = 42;
        let result = World::new(
            &config,
            ScriptRegistry::with_builtin(),
            Arc::new(SessionManager::new(8)),
            8086,
        );
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[test]
    fn login_sends_connect_to_and_queues_verify_world() {
        let (mut world, sessions) = world();
        let (id, mut realm) = connect(&sessions, "alice");

        let guid = world.login(id, 5).unwrap();
        assert_eq!(world.player(id).unwrap().guid, guid);

        let frame = realm.try_recv().unwrap();
        assert_eq!(frame.opcode, smsg::CONNECT_TO);
        let connect_to: ConnectTo = decode_response(frame.payload()).unwrap();
        assert_eq!(connect_to.port, 8086);

        // The instance socket is not attached yet.
        let session = sessions.get(id).unwrap();
        assert_eq!(session.pending(ConnectionType::Instance), 1);
        let redeemed = sessions.redeem_connect_key(connect_to.key, connect_to.serial).unwrap();
        assert_eq!(redeemed.id(), id);

        let (tx, mut instance) = mpsc::channel(64);
        session.attach(ConnectionType::Instance, tx).unwrap();
        let verify = instance.try_recv().unwrap();
        assert_eq!(verify.opcode, smsg::LOGIN_VERIFY_WORLD);
        let verify: LoginVerifyWorld = decode_response(verify.payload()).unwrap();
        assert_eq!(verify.guid, guid.raw());
    }

    #[test]
    fn same_character_cannot_log_in_twice() {
        let (mut world, sessions) = world();
        let (first, _r1) = connect(&sessions, "alice");
        let (second, _r2) = connect(&sessions, "bob");

        world.login(first, 5).unwrap();
        assert!(world.login(second, 5).is_err());
        assert!(world.login(first, 6).is_err());
        assert!(world.login(second, 0).is_err());
        assert_eq!(world.player_count(), 1);
    }

    #[test]
    fn disconnect_cancels_session_timers() {
        let (mut world, sessions) = world();
        let (alice, _r1) = connect(&sessions, "alice");
        let (bob, _r2) = connect(&sessions, "bob");
        let alice_guid = world.login(alice, 1).unwrap();
        let bob_guid = world.login(bob, 2).unwrap();

        let map = world.map_mut(MapId(0)).unwrap();
        let before = map.pending_timers();
        map.propose_duel(alice_guid, bob_guid).unwrap();
        assert_eq!(map.pending_timers(), before + 1);

        world.disconnect(alice);
        assert!(world.player(alice).is_none());
        assert_eq!(world.map(MapId(0)).unwrap().pending_timers(), before);

        // The duel can no longer be answered.
        let (map, guid) = world.player_map(bob).unwrap();
        assert!(map.respond_duel(guid, alice_guid, true).is_err());
    }

    #[test]
    fn logout_keeps_the_realm_connection() {
        let (mut world, sessions) = world();
        let (id, mut realm) = connect(&sessions, "alice");
        world.login(id, 3).unwrap();
        while realm.try_recv().is_ok() {}

        world.logout(id).unwrap();
        assert!(world.player(id).is_none());
        assert_eq!(realm.try_recv().unwrap().opcode, smsg::LOGOUT_COMPLETE);
        assert!(sessions.get(id).unwrap().is_attached(ConnectionType::Realm));
        assert!(world.logout(id).is_err());
    }
}
