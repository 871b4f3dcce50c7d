//! Configuration management for the world server daemon.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use crate::cli::CliArgs;
use realm_protocol::DEFAULT_MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::info;
use world_server::{SecurityConfig, ServerConfig, WorldConfig};

fn default_tick_interval() -> u64 {
    50 // 20 ticks per second
}

fn default_max_connections() -> usize {
    1000
}

/// Default for connection_timeout
pub fn default_connection_timeout() -> u64 {
    60
}

fn default_map_update_threads() -> usize {
    1
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_outbound_queue_limit() -> usize {
    512
}

fn default_motd() -> String {
    "Welcome to the realm.".to_string()
}

/// Application configuration loaded from TOML file.
///
/// This is the main configuration structure that encompasses all server
/// settings: networking, the world content, security and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    pub server: ServerSettings,
    /// Maps, creature templates and spawns
    #[serde(default)]
    pub world: WorldConfig,
    /// Connection caps and packet rate limiting
    #[serde(default)]
    pub security: SecurityConfig,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
///
/// Controls network binding, connection limits, timeouts and the simulation tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8085")
    pub bind_address: String,
    /// Port advertised for instance connections; the bound port when unset
    #[serde(default)]
    pub instance_port: Option<u16>,
    /// Maximum number of concurrent sessions
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connection idle timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Whether to use SO_REUSEPORT for multi-threaded accept loops (Unix only)
    #[serde(default)]
    pub use_reuse_port: bool,
    /// World tick interval in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Threads updating maps each tick; 0 means one per CPU core
    #[serde(default = "default_map_update_threads")]
    pub map_update_threads: usize,
    /// Largest accepted inbound payload in bytes
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Frames buffered per connection before the session is dropped
    #[serde(default = "default_outbound_queue_limit")]
    pub outbound_queue_limit: usize,
    /// Message of the day
    #[serde(default = "default_motd")]
    pub motd: String,
    /// Localized messages of the day keyed by locale tag (e.g. "frFR")
    #[serde(default)]
    pub motd_locales: BTreeMap<String, String>,
}

/// Logging system configuration.
///
/// Controls log output format and level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8085".to_string(),
            instance_port: None,
            max_connections: default_max_connections(),
            connection_timeout: default_connection_timeout(),
            use_reuse_port: false,
            tick_interval_ms: default_tick_interval(),
            map_update_threads: default_map_update_threads(),
            max_frame_size: default_max_frame_size(),
            outbound_queue_limit: default_outbound_queue_limit(),
            motd: default_motd(),
            motd_locales: BTreeMap::new(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            world: WorldConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `path`, writing the defaults there first if
    /// the file does not exist.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides on top of the file contents.
    pub fn apply_overrides(&mut self, args: &CliArgs) {
        if let Some(bind_address) = &args.bind_address {
            self.server.bind_address = bind_address.clone();
        }
        if let Some(log_level) = &args.log_level {
            self.logging.level = log_level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
        if let Some(threads) = args.map_threads {
            self.server.map_update_threads = threads;
        }
    }

    /// Converts into the configuration the server is built from.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let map_update_threads = match self.server.map_update_threads {
            0 => num_cpus::get(),
            threads => threads,
        };
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            instance_port: self.server.instance_port,
            max_connections: self.server.max_connections,
            connection_timeout: self.server.connection_timeout,
            use_reuse_port: self.server.use_reuse_port,
            tick_interval_ms: self.server.tick_interval_ms,
            map_update_threads,
            max_frame_size: self.server.max_frame_size,
            outbound_queue_limit: self.server.outbound_queue_limit,
            motd: self.server.motd.clone(),
            motd_locales: self.server.motd_locales.clone(),
            security: self.security.clone(),
            world: self.world.clone(),
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        // Validate bind address
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!("Invalid bind address: {}", &self.server.bind_address));
        }
        if self.server.instance_port == Some(0) {
            return Err("server.instance_port cannot be 0".to_string());
        }
        if self.server.tick_interval_ms == 0 {
            return Err("server.tick_interval_ms must be greater than 0".to_string());
        }
        if self.server.outbound_queue_limit == 0 {
            return Err("server.outbound_queue_limit must be greater than 0".to_string());
        }
        if self.server.max_frame_size == 0 {
            return Err("server.max_frame_size must be greater than 0".to_string());
        }
        if self.security.enable_rate_limiting && self.security.max_packets_per_second == 0 {
            return Err("security.max_packets_per_second must be greater than 0".to_string());
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        self.validate_world()
    }

    fn validate_world(&self) -> Result<(), String> {
        let world = &self.world;
        let mut maps = HashSet::new();
        for map in &world.maps {
            if !maps.insert(map.id) {
                return Err(format!("Map {} is configured twice", map.id));
            }
            if map.activation_radius == 0 {
                return Err(format!("Map {} activation_radius must be at least 1", map.id));
            }
        }
        if !maps.contains(&world.start.map) {
            return Err(format!("Start map {} is not configured", world.start.map));
        }

        let mut templates = HashSet::new();
        for template in &world.templates {
            if !templates.insert(template.entry) {
                return Err(format!("Creature template {} is defined twice", template.entry));
            }
            if template.min_damage > template.max_damage {
                return Err(format!(
                    "Creature template {} has min_damage above max_damage",
                    template.entry
                ));
            }
        }

        for spawn in &world.spawns {
            if !maps.contains(&spawn.map) {
                return Err(format!("Spawn of entry {} is on unknown map {}", spawn.entry, spawn.map));
            }
            if !templates.contains(&spawn.entry) {
                return Err(format!("Spawn refers to unknown creature template {}", spawn.entry));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind_address, "127.0.0.1:8085");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.world.maps.len(), 1);
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.server.max_connections, 1000);

        // The written defaults load back unchanged.
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.server.bind_address, config.server.bind_address);
        assert_eq!(reloaded.world.spawns.len(), config.world.spawns.len());
    }

    #[tokio::test]
    async fn test_load_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("realm.toml");
        tokio::fs::write(
            &path,
            r#"
[server]
bind_address = "0.0.0.0:9000"
map_update_threads = 2

[server.motd_locales]
deDE = "Willkommen"

[logging]
level = "debug"
json_format = true

[security]
max_packets_per_second = 50
"#,
        )
        .await
        .unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.tick_interval_ms, 50);
        assert_eq!(config.security.max_packets_per_second, 50);
        assert!(config.security.enable_rate_limiting);
        assert_eq!(config.world.maps.len(), 1);

        let server = config.to_server_config().unwrap();
        assert_eq!(server.bind_address.port(), 9000);
        assert_eq!(server.map_update_threads, 2);
        assert_eq!(server.motd_locales.get("deDE").map(String::as_str), Some("Willkommen"));
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = AppConfig::default();
        let args = CliArgs::try_parse_from(["worldd", "--bind", "0.0.0.0:7000", "--log-level", "warn", "-t", "3"])
            .unwrap();
        config.apply_overrides(&args);
        assert_eq!(config.server.bind_address, "0.0.0.0:7000");
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.server.map_update_threads, 3);
        assert!(!config.logging.json_format);
    }

    #[test]
    fn test_zero_map_threads_uses_every_core() {
        let mut config = AppConfig::default();
        config.server.map_update_threads = 0;
        let server = config.to_server_config().unwrap();
        assert_eq!(server.map_update_threads, num_cpus::get());
    }

    #[test]
    fn test_validation_invalid_bind_address() {
        let mut config = AppConfig::default();
        config.server.bind_address = "invalid".to_string();
        assert!(config.validate().is_err());
        assert!(config.to_server_config().is_err());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_unknown_spawn_template() {
        let mut config = AppConfig::default();
        config.world.spawns[0].entry = 999;
        let err = config.validate().unwrap_err();
        assert!(err.contains("999"));
    }

    #[test]
    fn test_validation_missing_start_map() {
        let mut config = AppConfig::default();
        config.world.start.map = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_tick() {
        let mut config = AppConfig::default();
        config.server.tick_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
