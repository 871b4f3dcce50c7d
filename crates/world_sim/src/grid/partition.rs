//! Cell membership and activity tracking for one map.
//!
//! Every tracked object lives in exactly one cell. A cell is active when a
//! player-controlled object sits within `activation_radius` cells of it
//! (Chebyshev distance); only objects in active cells are updated by the
//! map tick.

use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use super::{cells_for_radius, CellCoord};
use crate::types::{ObjectGuid, Position};

#[derive(Debug, Clone, Copy)]
struct Placement {
    cell: CellCoord,
    position: Position,
    player_controlled: bool,
}

/// Outcome of [`SpatialPartition::relocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relocation {
    /// The object is not tracked by this partition.
    NotTracked,
    SameCell(CellCoord),
    Crossed { from: CellCoord, to: CellCoord },
}

/// Grid-cell index of the objects on a map.
#[derive(Debug)]
pub struct SpatialPartition {
    cells: HashMap<CellCoord, BTreeSet<ObjectGuid>>,
    locations: HashMap<ObjectGuid, Placement>,
    /// Player-controlled objects per cell, used to derive activity.
    player_cells: HashMap<CellCoord, usize>,
    activation_radius: u32,
}

impl SpatialPartition {
    pub fn new(activation_radius: u32) -> Self {
        Self {
            cells: HashMap::new(),
            locations: HashMap::new(),
            player_cells: HashMap::new(),
            activation_radius,
        }
    }

    pub fn activation_radius(&self) -> u32 {
        self.activation_radius
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn contains(&self, guid: ObjectGuid) -> bool {
        self.locations.contains_key(&guid)
    }

    /// Starts tracking `guid` at `position`. An already tracked object is
    /// moved instead.
    pub fn insert(&mut self, guid: ObjectGuid, position: Position, player_controlled: bool) -> CellCoord {
        if self.locations.contains_key(&guid) {
            self.remove(guid);
        }
        let cell = CellCoord::from_position(position.x, position.y);
        self.cells.entry(cell).or_default().insert(guid);
        if player_controlled {
            *self.player_cells.entry(cell).or_default() += 1;
        }
        self.locations.insert(
            guid,
            Placement {
                cell,
                position,
                player_controlled,
            },
        );
        cell
    }

    pub fn remove(&mut self, guid: ObjectGuid) -> Option<CellCoord> {
        let placement = self.locations.remove(&guid)?;
        self.detach(guid, placement.cell, placement.player_controlled);
        Some(placement.cell)
    }

    /// Moves `guid` to `position`, switching cells when a boundary is
    /// crossed. The old cell loses the object before the new one gains it,
    /// so the object is never in two cells at once.
    pub fn relocate(&mut self, guid: ObjectGuid, position: Position) -> Relocation {
        let Some(placement) = self.locations.get(&guid).copied() else {
            return Relocation::NotTracked;
        };
        let to = CellCoord::from_position(position.x, position.y);
        let from = placement.cell;

        if from != to {
            self.detach(guid, from, placement.player_controlled);
            self.cells.entry(to).or_default().insert(guid);
            if placement.player_controlled {
                *self.player_cells.entry(to).or_default() += 1;
            }
            trace!(%guid, ?from, ?to, "Object crossed cell boundary");
        }

        if let Some(entry) = self.locations.get_mut(&guid) {
            entry.cell = to;
            entry.position = position;
        }

        if from == to {
            Relocation::SameCell(to)
        } else {
            Relocation::Crossed { from, to }
        }
    }

    fn detach(&mut self, guid: ObjectGuid, cell: CellCoord, player_controlled: bool) {
        if let Some(members) = self.cells.get_mut(&cell) {
            members.remove(&guid);
            if members.is_empty() {
                self.cells.remove(&cell);
            }
        }
        if player_controlled {
            if let Some(count) = self.player_cells.get_mut(&cell) {
                *count -= 1;
                if *count == 0 {
                    self.player_cells.remove(&cell);
                }
            }
        }
    }

    pub fn cell_of(&self, guid: ObjectGuid) -> Option<CellCoord> {
        self.locations.get(&guid).map(|p| p.cell)
    }

    pub fn position_of(&self, guid: ObjectGuid) -> Option<Position> {
        self.locations.get(&guid).map(|p| p.position)
    }

    pub fn objects_in(&self, cell: CellCoord) -> impl Iterator<Item = ObjectGuid> + '_ {
        self.cells.get(&cell).into_iter().flatten().copied()
    }

    /// Cells within the activation radius of any player-controlled object.
    pub fn active_cells(&self) -> BTreeSet<CellCoord> {
        self.player_cells
            .keys()
            .flat_map(|cell| cell.neighbourhood(self.activation_radius))
            .collect()
    }

    pub fn is_active(&self, cell: CellCoord) -> bool {
        self.player_cells
            .keys()
            .any(|player_cell| player_cell.chebyshev_distance(cell) <= self.activation_radius)
    }

    /// Objects in active cells at this instant, ordered by cell then GUID.
    ///
    /// The map tick iterates this snapshot rather than the live cells, so an
    /// object that moves into a cell not yet visited is not updated twice.
    pub fn update_snapshot(&self) -> Vec<ObjectGuid> {
        let mut snapshot = Vec::new();
        for cell in self.active_cells() {
            if let Some(members) = self.cells.get(&cell) {
                snapshot.extend(members.iter().copied());
            }
        }
        snapshot
    }

    /// Objects whose ground distance to `center` is at most `radius`,
    /// sorted by GUID.
    pub fn objects_near(&self, center: Position, radius: f32) -> Vec<ObjectGuid> {
        let origin = CellCoord::from_position(center.x, center.y);
        let mut found: Vec<ObjectGuid> = origin
            .neighbourhood(cells_for_radius(radius))
            .filter_map(|cell| self.cells.get(&cell))
            .flatten()
            .copied()
            .filter(|guid| {
                self.locations
                    .get(guid)
                    .is_some_and(|p| p.position.distance_2d(&center) <= radius)
            })
            .collect();
        found.sort_unstable();
        found
    }
}
