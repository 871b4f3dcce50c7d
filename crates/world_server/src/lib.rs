//! # World Server
//!
//! The networked half of the realm world server. It accepts client sockets,
//! multiplexes each session across a realm and an instance connection, and
//! feeds decoded packets to a single world runner that owns every map.
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Accept loops** - One per listener; `use_reuse_port` scales them to the
//!   number of CPU cores
//! * **Connection tasks** - Frame splitting, `CMSG_PING` and keep-alive
//!   handling, opcode decoding
//! * **Session Manager** - Sessions, their two connection slots and the
//!   one-shot keys instance sockets authenticate with
//! * **World Runner** - Runs packet jobs in arrival order and ticks the maps
//! * **Message Router** - Turns simulation notifications into frames for the
//!   right sessions
//!
//! ### Session Flow
//!
//! 1. The client opens the realm socket and sends `CMSG_AUTH_SESSION`
//! 2. The server answers `SMSG_AUTH_RESPONSE` with the localized message of
//!    the day
//! 3. `CMSG_PLAYER_LOGIN` places the character and sends `SMSG_CONNECT_TO`
//!    with a one-shot key
//! 4. The client opens the instance socket with `CMSG_AUTH_CONTINUED_SESSION`
//!    and receives `SMSG_RESUME_COMMS` followed by everything queued for it
//!
//! Frames addressed to an instance connection that is not attached yet are
//! queued per session, bounded by `outbound_queue_limit`. Exceeding the bound
//! closes that session only.
//!
//! ## Error Handling
//!
//! The server uses structured error types to categorize failures:
//!
//! * [`ServerError`] - Startup, configuration and socket failures
//! * [`SessionError`] - Delivery failures that end one session
//!
//! Handler faults and panics are contained by the world runner and cost only
//! the packet that caused them.

// Re-export core types and functions for easy access
pub use config::{MapConfig, SecurityConfig, ServerConfig, SpawnConfig, StartLocation, WorldConfig};
pub use connection::{AccountInfo, Session, SessionManager};
pub use error::{ServerError, SessionError};
pub use handlers::{build_opcode_table, WorldTable};
pub use server::WorldServer;
pub use utils::{create_server, create_server_with_config};
pub use world::{World, WorldCommand, WorldRunner};

// Public module declarations
pub mod config;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod messaging;
pub mod security;
pub mod server;
pub mod utils;
pub mod world;
