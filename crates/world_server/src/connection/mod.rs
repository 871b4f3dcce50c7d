//! Session and connection management.
//!
//! A [`Session`] is created when a realm socket authenticates and carries up
//! to two sockets: the realm connection for its whole life and an instance
//! connection while the player is in a map. The [`SessionManager`] is the
//! registry both the network tasks and the world runner share.

pub mod manager;
pub mod session;

pub use manager::SessionManager;
pub use session::{AccountInfo, Session};
