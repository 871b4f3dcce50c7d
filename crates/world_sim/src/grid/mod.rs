//! Fixed grid geometry for a map.
//!
//! A map is a square of 64×64 grids centred on the origin, each grid split
//! into 8×8 cells, giving 512 cells per edge. Cell coordinates grow with the
//! world coordinate and positions outside the map are clamped onto the edge
//! cells rather than rejected.

pub mod partition;

pub use partition::{Relocation, SpatialPartition};

/// Grids along one edge of a map.
pub const MAX_NUMBER_OF_GRIDS: u32 = 64;
/// Cells along one edge of a grid.
pub const MAX_NUMBER_OF_CELLS: u32 = 8;
/// Cells along one edge of a map.
pub const TOTAL_NUMBER_OF_CELLS_PER_MAP: u32 = MAX_NUMBER_OF_GRIDS * MAX_NUMBER_OF_CELLS;
/// Edge length of a grid in yards.
pub const SIZE_OF_GRIDS: f32 = 533.333_33;
/// Edge length of a cell in yards.
pub const SIZE_OF_GRID_CELL: f32 = SIZE_OF_GRIDS / MAX_NUMBER_OF_CELLS as f32;
/// Cell index that contains the origin.
pub const CENTER_GRID_CELL_ID: u32 = TOTAL_NUMBER_OF_CELLS_PER_MAP / 2;
/// Half the edge length of a map in yards.
pub const MAP_HALFSIZE: f32 = SIZE_OF_GRIDS * MAX_NUMBER_OF_GRIDS as f32 / 2.0;

const MAX_CELL_INDEX: u32 = TOTAL_NUMBER_OF_CELLS_PER_MAP - 1;

/// Index of a cell on a map, both axes in `[0, 511]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    pub x: u32,
    pub y: u32,
}

impl CellCoord {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Cell containing the world position `(x, y)`. Never fails: values off
    /// the map clamp to the edge cells and NaN maps to cell 0.
    pub fn from_position(x: f32, y: f32) -> Self {
        Self {
            x: axis_to_cell(x),
            y: axis_to_cell(y),
        }
    }

    /// Grid this cell belongs to.
    pub fn grid(self) -> (u32, u32) {
        (self.x / MAX_NUMBER_OF_CELLS, self.y / MAX_NUMBER_OF_CELLS)
    }

    pub fn chebyshev_distance(self, other: CellCoord) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// All cells within `radius` (Chebyshev), clipped to the map.
    pub fn neighbourhood(self, radius: u32) -> impl Iterator<Item = CellCoord> {
        let min_x = self.x.saturating_sub(radius);
        let max_x = (self.x + radius).min(MAX_CELL_INDEX);
        let min_y = self.y.saturating_sub(radius);
        let max_y = (self.y + radius).min(MAX_CELL_INDEX);
        (min_x..=max_x).flat_map(move |x| (min_y..=max_y).map(move |y| CellCoord { x, y }))
    }
}

fn axis_to_cell(coord: f32) -> u32 {
    let raw = (coord / SIZE_OF_GRID_CELL).floor() + CENTER_GRID_CELL_ID as f32;
    if raw.is_nan() {
        return 0;
    }
    raw.clamp(0.0, MAX_CELL_INDEX as f32) as u32
}

/// Number of cells a radius in yards spans, rounded up.
pub fn cells_for_radius(radius: f32) -> u32 {
    if !(radius > 0.0) {
        return 0;
    }
    (radius / SIZE_OF_GRID_CELL)
        .ceil()
        .min(TOTAL_NUMBER_OF_CELLS_PER_MAP as f32) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_sits_on_centre_cell() {
        assert_eq!(CellCoord::from_position(0.0, 0.0), CellCoord::new(256, 256));
        assert_eq!(CellCoord::from_position(-0.01, 0.0), CellCoord::new(255, 256));
        assert_eq!(
            CellCoord::from_position(SIZE_OF_GRID_CELL + 0.01, 0.0),
            CellCoord::new(257, 256)
        );
    }

    #[test]
    fn out_of_range_positions_clamp() {
        assert_eq!(CellCoord::from_position(1.0e9, -1.0e9), CellCoord::new(511, 0));
        assert_eq!(
            CellCoord::from_position(f32::INFINITY, f32::NEG_INFINITY),
            CellCoord::new(511, 0)
        );
        assert_eq!(CellCoord::from_position(f32::NAN, 10.0), CellCoord::new(0, 256));
        assert_eq!(
            CellCoord::from_position(MAP_HALFSIZE - 0.5, -MAP_HALFSIZE + 0.5),
            CellCoord::new(511, 0)
        );
    }

    #[test]
    fn neighbourhood_is_clipped_at_edges() {
        assert_eq!(CellCoord::new(0, 0).neighbourhood(1).count(), 4);
        assert_eq!(CellCoord::new(10, 10).neighbourhood(1).count(), 9);
        assert_eq!(CellCoord::new(511, 300).neighbourhood(2).count(), 15);
    }

    #[test]
    fn radius_to_cells() {
        assert_eq!(cells_for_radius(0.0), 0);
        assert_eq!(cells_for_radius(f32::NAN), 0);
        assert_eq!(cells_for_radius(10.0), 1);
        assert_eq!(cells_for_radius(SIZE_OF_GRID_CELL * 2.5), 3);
    }
}
