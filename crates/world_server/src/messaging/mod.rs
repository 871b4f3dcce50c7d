//! Outbound messaging from the simulation to client sessions.

pub mod router;

pub use router::{encode_event, route_notifications};
