//! Chunk grid coordinates and 8-way neighbor topology.
//!
//! The grid is infinite in both axes. North is +y and East is +x, so the
//! chunk at (0, 1) sits directly north of the chunk at (0, 0).

use serde::{Deserialize, Serialize};

/// Integer position of a chunk on the world grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
}

impl GridCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Coordinate of the neighbor in the given direction.
    pub fn neighbor(self, dir: Direction) -> Self {
        let (dx, dy) = dir.offset();
        Self::new(self.x.wrapping_add(dx), self.y.wrapping_add(dy))
    }

    /// All 8 neighbors, in `Direction::ALL` order.
    pub fn neighbors(self) -> impl Iterator<Item = (Direction, GridCoord)> {
        Direction::ALL.into_iter().map(move |dir| (dir, self.neighbor(dir)))
    }
}

impl From<(i32, i32)> for GridCoord {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

impl std::fmt::Display for GridCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One of the 8 compass directions around a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    /// Clockwise starting at North.
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// Stable index into `ALL`, usable for per-direction arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn opposite(self) -> Self {
        Self::ALL[(self.index() + 4) % 8]
    }

    /// Grid step `(dx, dy)` for this direction.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, 1),
            Direction::NorthEast => (1, 1),
            Direction::East => (1, 0),
            Direction::SouthEast => (1, -1),
            Direction::South => (0, -1),
            Direction::SouthWest => (-1, -1),
            Direction::West => (-1, 0),
            Direction::NorthWest => (-1, 1),
        }
    }

    /// Inverse of `offset`. `(0, 0)` and anything outside the unit ring is `None`.
    pub fn from_offset(dx: i32, dy: i32) -> Option<Self> {
        match (dx, dy) {
            (0, 1) => Some(Direction::North),
            (1, 1) => Some(Direction::NorthEast),
            (1, 0) => Some(Direction::East),
            (1, -1) => Some(Direction::SouthEast),
            (0, -1) => Some(Direction::South),
            (-1, -1) => Some(Direction::SouthWest),
            (-1, 0) => Some(Direction::West),
            (-1, 1) => Some(Direction::NorthWest),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Direction::North => "N",
            Direction::NorthEast => "NE",
            Direction::East => "E",
            Direction::SouthEast => "SE",
            Direction::South => "S",
            Direction::SouthWest => "SW",
            Direction::West => "W",
            Direction::NorthWest => "NW",
        };
        write!(f, "{}", name)
    }
}

/// Map a world-space position to the chunk containing it.
/// The ground plane is x/z; the vertical component is ignored.
///
/// Returns `None` for non-finite positions and for chunks outside the `i32` grid.
pub fn world_to_grid(world_pos: [f32; 3], chunk_size: f32) -> Option<GridCoord> {
    let axis = |v: f32| -> Option<i32> {
        let cell = (f64::from(v) / f64::from(chunk_size)).floor();
        if !cell.is_finite() || cell < f64::from(i32::MIN) || cell > f64::from(i32::MAX) {
            return None;
        }
        Some(cell as i32)
    };
    Some(GridCoord::new(axis(world_pos[0])?, axis(world_pos[2])?))
}

/// Square window of side `2 * radius + 1` around `center`, scanned row by row from the south.
/// Cells that would fall off the edge of the `i32` grid are left out.
pub fn window(center: GridCoord, radius: u32) -> Vec<GridCoord> {
    let r = i32::try_from(radius).unwrap_or(i32::MAX);
    let side = 2 * radius as usize + 1;
    let mut coords = Vec::with_capacity(side * side);
    for dy in -r..=r {
        let Some(y) = center.y.checked_add(dy) else {
            continue;
        };
        for dx in -r..=r {
            if let Some(x) = center.x.checked_add(dx) {
                coords.push(GridCoord::new(x, y));
            }
        }
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite_is_involution() {
        for dir in Direction::ALL {
            assert_eq!(dir.opposite().opposite(), dir);
            assert_ne!(dir.opposite(), dir);
        }
    }

    #[test]
    fn test_opposite_offsets_cancel() {
        for dir in Direction::ALL {
            let (dx, dy) = dir.offset();
            let (ox, oy) = dir.opposite().offset();
            assert_eq!((dx + ox, dy + oy), (0, 0));
        }
    }

    #[test]
    fn test_offset_round_trip() {
        for dir in Direction::ALL {
            let (dx, dy) = dir.offset();
            assert_eq!(Direction::from_offset(dx, dy), Some(dir));
        }
        assert_eq!(Direction::from_offset(0, 0), None);
        assert_eq!(Direction::from_offset(2, 0), None);
    }

    #[test]
    fn test_north_is_positive_y() {
        let origin = GridCoord::new(0, 0);
        assert_eq!(origin.neighbor(Direction::North), GridCoord::new(0, 1));
        assert_eq!(origin.neighbor(Direction::SouthWest), GridCoord::new(-1, -1));
    }

    #[test]
    fn test_world_to_grid_floors_negative() {
        assert_eq!(world_to_grid([0.0, 10.0, 0.0], 128.0), Some(GridCoord::new(0, 0)));
        assert_eq!(world_to_grid([127.9, 0.0, 128.0], 128.0), Some(GridCoord::new(0, 1)));
        assert_eq!(world_to_grid([-0.1, 0.0, -200.0], 128.0), Some(GridCoord::new(-1, -2)));
    }

    #[test]
    fn test_world_to_grid_rejects_unmappable_positions() {
        assert_eq!(world_to_grid([f32::NAN, 0.0, 0.0], 32.0), None);
        assert_eq!(world_to_grid([0.0, 0.0, f32::INFINITY], 32.0), None);
        assert_eq!(world_to_grid([1.0e12, 0.0, 0.0], 32.0), None);
        assert_eq!(world_to_grid([0.0, 0.0, -1.0e12], 32.0), None);
        // Vertical component is never looked at
        assert_eq!(world_to_grid([0.0, f32::NAN, 0.0], 32.0), Some(GridCoord::new(0, 0)));
    }

    #[test]
    fn test_window_stops_at_grid_edge() {
        let corner = GridCoord::new(i32::MAX, i32::MIN);
        let coords = window(corner, 1);
        // Only the western columns and northern rows exist
        assert_eq!(coords.len(), 4);
        assert!(coords.contains(&corner));
        assert!(coords.contains(&GridCoord::new(i32::MAX - 1, i32::MIN + 1)));
    }

    #[test]
    fn test_window_size_and_center() {
        let coords = window(GridCoord::new(2, -1), 1);
        assert_eq!(coords.len(), 9);
        assert!(coords.contains(&GridCoord::new(2, -1)));
        assert!(coords.iter().all(|c| (c.x - 2).abs() <= 1 && (c.y + 1).abs() <= 1));
        assert_eq!(coords[0], GridCoord::new(1, -2));
    }
}
