//! Utility functions and helper methods for the world server.
//!
//! This module provides convenient factory functions for creating server
//! instances with different configurations.

use crate::{config::ServerConfig, server::WorldServer};

/// Creates a new world server with default configuration.
///
/// This is a convenience function for quickly setting up a server
/// with sensible defaults for development and testing: one map, one
/// creature template and a single spawn.
///
/// # Example
///
/// ```rust
/// use world_server::create_server;
///
/// let server = create_server();
/// assert_eq!(server.config().max_connections, 1000);
/// ```
pub fn create_server() -> WorldServer {
    WorldServer::new(ServerConfig::default())
}

/// Creates a new world server with custom configuration.
///
/// # Example
///
/// ```rust
/// use world_server::{create_server_with_config, ServerConfig};
///
/// let config = ServerConfig {
///     bind_address: "0.0.0.0:9000".parse().unwrap(),
///     max_connections: 5000,
///     ..Default::default()
/// };
///
/// let server = create_server_with_config(config);
/// assert_eq!(server.config().max_connections, 5000);
/// ```
pub fn create_server_with_config(config: ServerConfig) -> WorldServer {
    WorldServer::new(config)
}
