//! # Core Type Definitions
//!
//! Identifiers and positions shared by every part of the simulation.
//!
//! ## Key Types
//!
//! - [`ObjectGuid`] - 64-bit object identifier with a type tag in the high 16 bits
//! - [`MapId`] - Identifier of a simulated map
//! - [`SessionId`] - Identifier of a connected client session
//! - [`Position`] - World coordinates plus facing
//!
//! ## Design Principles
//!
//! - **Type Safety**: Wrapper types prevent ID confusion (ObjectGuid vs SessionId)
//! - **Wire Friendly**: GUIDs and positions map 1:1 onto the packet fields

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Type tag stored in the high 16 bits of an [`ObjectGuid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HighGuid {
    Player,
    Creature,
    GameObject,
    AreaTrigger,
}

impl HighGuid {
    pub const fn tag(self) -> u16 {
        match self {
            HighGuid::Player => 0x0000,
            HighGuid::Creature => 0xF130,
            HighGuid::GameObject => 0xF110,
            HighGuid::AreaTrigger => 0xF140,
        }
    }

    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0x0000 => Some(HighGuid::Player),
            0xF130 => Some(HighGuid::Creature),
            0xF110 => Some(HighGuid::GameObject),
            0xF140 => Some(HighGuid::AreaTrigger),
            _ => None,
        }
    }
}

/// Unique identifier of an object in the world.
///
/// # Examples
///
/// ```rust
/// use world_sim::{HighGuid, ObjectGuid};
///
/// let guid = ObjectGuid::new(HighGuid::Creature, 42);
/// assert!(guid.is_creature());
/// assert_eq!(guid.counter(), 42);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ObjectGuid(pub u64);

impl ObjectGuid {
    pub const EMPTY: ObjectGuid = ObjectGuid(0);

    const COUNTER_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

    pub const fn new(high: HighGuid, counter: u64) -> Self {
        Self(((high.tag() as u64) << 48) | (counter & Self::COUNTER_MASK))
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub fn high(self) -> Option<HighGuid> {
        HighGuid::from_tag((self.0 >> 48) as u16)
    }

    pub const fn counter(self) -> u64 {
        self.0 & Self::COUNTER_MASK
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_player(self) -> bool {
        !self.is_empty() && self.high() == Some(HighGuid::Player)
    }

    pub fn is_creature(self) -> bool {
        self.high() == Some(HighGuid::Creature)
    }
}

impl fmt::Display for ObjectGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.high() {
            Some(HighGuid::Player) => write!(f, "Player-{}", self.counter()),
            Some(HighGuid::Creature) => write!(f, "Creature-{}", self.counter()),
            Some(HighGuid::GameObject) => write!(f, "GameObject-{}", self.counter()),
            Some(HighGuid::AreaTrigger) => write!(f, "AreaTrigger-{}", self.counter()),
            None => write!(f, "Guid-{:#018x}", self.0),
        }
    }
}

/// Identifier of a simulated map.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct MapId(pub u32);

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map {}", self.0)
    }
}

/// Identifier of a client session, assigned by the connection layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

// ============================================================================
// Spatial
// ============================================================================

/// A point in map coordinates plus facing in radians.
///
/// Single precision matches the wire format; a map is roughly 34 km across
/// so f32 keeps sub-centimetre resolution everywhere on it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default)]
    pub orientation: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            orientation: 0.0,
        }
    }

    pub const fn with_orientation(mut self, orientation: f32) -> Self {
        self.orientation = orientation;
        self
    }

    /// Distance on the ground plane, ignoring height.
    pub fn distance_2d(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn distance(&self, other: &Position) -> f32 {
        let dz = self.z - other.z;
        let flat = self.distance_2d(other);
        (flat * flat + dz * dz).sqrt()
    }

    /// Whether the coordinates are usable for placement.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}
