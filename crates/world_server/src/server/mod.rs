//! Core server implementation and connection handling.
//!
//! This module contains the main world server structure and the logic
//! for handling realm and instance sockets and the server lifecycle.

pub mod core;
pub mod handlers;

pub use core::WorldServer;
pub use handlers::ConnectionContext;
