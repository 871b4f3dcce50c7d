//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize the world server: socket limits, the tick cadence, the
//! security settings and the static world content maps are built from.

use realm_protocol::DEFAULT_MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use world_sim::{CreatureTemplate, Faction, Position};

/// Configuration structure for the world server.
///
/// Contains all necessary parameters to configure server behavior including
/// network settings, connection limits, the simulation tick and the world
/// content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Port advertised in `SMSG_CONNECT_TO`. `None` reuses the bound port.
    pub instance_port: Option<u16>,

    /// Maximum number of concurrent sessions allowed
    pub max_connections: usize,

    /// Idle timeout in seconds; a socket that sends nothing for this long is closed
    pub connection_timeout: u64,

    /// Whether to use SO_REUSEPORT for multi-threaded accept loops
    pub use_reuse_port: bool,

    /// World tick interval in milliseconds
    pub tick_interval_ms: u64,

    /// Threads used to update maps each tick. 1 updates them in sequence.
    pub map_update_threads: usize,

    /// Largest accepted inbound payload in bytes
    pub max_frame_size: usize,

    /// Frames buffered per connection slot before the session is closed
    pub outbound_queue_limit: usize,

    /// Message of the day sent with a successful auth response
    pub motd: String,

    /// Per-locale overrides of `motd`, keyed by tag such as `"deDE"`
    pub motd_locales: BTreeMap<String, String>,

    /// Security configuration settings
    pub security: SecurityConfig,

    /// Maps, templates and spawns
    pub world: WorldConfig,
}

/// Security configuration for connection and packet flood protection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable per-IP packet rate limiting
    pub enable_rate_limiting: bool,

    /// Packets per second allowed per IP once the burst is spent
    pub max_packets_per_second: u32,

    /// Enable per-IP connection caps
    pub enable_ddos_protection: bool,

    /// Banned IP addresses
    pub banned_ips: Vec<IpAddr>,

    /// Maximum concurrent connections per IP
    pub max_connections_per_ip: u32,
}

/// Static world content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Where new characters appear
    pub start: StartLocation,

    /// Faction assigned to every player character
    pub player_faction: Faction,

    pub maps: Vec<MapConfig>,

    pub templates: Vec<CreatureTemplate>,

    pub spawns: Vec<SpawnConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartLocation {
    pub map: u32,
    pub position: Position,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    pub id: u32,
    #[serde(default = "default_activation_radius")]
    pub activation_radius: u32,
    #[serde(default = "default_visibility_distance")]
    pub visibility_distance: f32,
    #[serde(default)]
    pub instance_script: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnConfig {
    pub map: u32,
    pub entry: u32,
    pub position: Position,
}

fn default_activation_radius() -> u32 {
    1
}

fn default_visibility_distance() -> f32 {
    100.0
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8085)),
            instance_port: None,
            max_connections: 1000,
            connection_timeout: 60,
            use_reuse_port: false,
            tick_interval_ms: 50, // 20 ticks per second by default
            map_update_threads: 1,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            outbound_queue_limit: 512,
            motd: "Welcome to the realm.".to_string(),
            motd_locales: BTreeMap::new(),
            security: SecurityConfig::default(),
            world: WorldConfig::default(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_rate_limiting: true,
            max_packets_per_second: 200,
            enable_ddos_protection: true,
            banned_ips: Vec::new(),
            max_connections_per_ip: 10,
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            start: StartLocation {
                map: 0,
                position: Position::new(0.0, 0.0, 0.0),
            },
            player_faction: Faction::Alliance,
            maps: vec![MapConfig {
                id: 0,
                activation_radius: default_activation_radius(),
                visibility_distance: default_visibility_distance(),
                instance_script: None,
            }],
            templates: vec![CreatureTemplate {
                entry: 1,
                name: "Kobold Vermin".to_string(),
                max_health: 100,
                faction: Faction::Monster,
                min_damage: 2,
                max_damage: 4,
                attack_time_ms: 2000,
                aggro_radius: 10.0,
                ai_name: None,
                boss_id: None,
                respawn_delay_secs: 30,
            }],
            spawns: vec![SpawnConfig {
                map: 0,
                entry: 1,
                position: Position::new(40.0, 40.0, 0.0),
            }],
        }
    }
}
