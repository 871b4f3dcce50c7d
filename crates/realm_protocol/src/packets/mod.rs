//! Representative packet catalogue.
//!
//! Each packet implements [`ClientPacket`](crate::ClientPacket) or
//! [`ServerPacket`](crate::ServerPacket). Layouts are this server's own.

pub mod auth;
pub mod combat;
pub mod duel;
pub mod instance;
pub mod misc;
pub mod movement;

pub use auth::*;
pub use combat::*;
pub use duel::*;
pub use instance::*;
pub use misc::*;
pub use movement::*;
