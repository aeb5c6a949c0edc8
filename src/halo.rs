//! Halo maps: a chunk's height field padded with strips of its 8 neighbors.
//!
//! A halo for a chunk of resolution `R` with border `b` is `R + 2b` cells
//! wide. The chunk occupies `(b, b, R, R)`; each side and corner of the
//! padding mirrors the touching edge of the neighbor in that direction.
//! Building reads those strips from the neighbors, deconstructing writes the
//! same strips back, using the tables below in both directions.

use log::warn;

use crate::error::HaloError;
use crate::grid::{Direction, GridCoord};
use crate::tilemap::{HeightField, Rect};

/// One rectangle copy: `source` in the field being read, `dest` origin in the field being written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BorderCopy {
    pub source: Rect,
    pub dest: (usize, usize),
}

impl BorderCopy {
    pub fn dest_rect(&self) -> Rect {
        self.source.moved_to(self.dest.0, self.dest.1)
    }
}

/// Copy from the neighbor in `dir` into the halo.
pub fn build_copy(dir: Direction, resolution: usize, border: usize) -> BorderCopy {
    let r = resolution;
    let b = border;
    let far = r + b; // first padding cell past the chunk, in halo space
    let (source, dest) = match dir {
        Direction::North => (Rect::new(0, 0, r, b), (b, far)),
        Direction::East => (Rect::new(0, 0, b, r), (far, b)),
        Direction::South => (Rect::new(0, r - b, r, b), (b, 0)),
        Direction::West => (Rect::new(r - b, 0, b, r), (0, b)),
        Direction::NorthEast => (Rect::new(0, 0, b, b), (far, far)),
        Direction::SouthEast => (Rect::new(0, r - b, b, b), (far, 0)),
        Direction::SouthWest => (Rect::new(r - b, r - b, b, b), (0, 0)),
        Direction::NorthWest => (Rect::new(r - b, 0, b, b), (0, far)),
    };
    BorderCopy { source, dest }
}

/// Copy from the halo back into the neighbor in `dir`.
pub fn deconstruct_copy(dir: Direction, resolution: usize, border: usize) -> BorderCopy {
    let r = resolution;
    let b = border;
    let far = r + b;
    let (source, dest) = match dir {
        Direction::North => (Rect::new(b, far, r, b), (0, 0)),
        Direction::East => (Rect::new(far, b, b, r), (0, 0)),
        Direction::South => (Rect::new(b, 0, r, b), (0, r - b)),
        Direction::West => (Rect::new(0, b, b, r), (r - b, 0)),
        Direction::NorthEast => (Rect::new(far, far, b, b), (0, 0)),
        Direction::SouthEast => (Rect::new(far, 0, b, b), (0, r - b)),
        Direction::SouthWest => (Rect::new(0, 0, b, b), (r - b, r - b)),
        Direction::NorthWest => (Rect::new(0, far, b, b), (r - b, 0)),
    };
    BorderCopy { source, dest }
}

/// Where the chunk itself sits inside its halo.
pub fn center_rect(resolution: usize, border: usize) -> Rect {
    Rect::new(border, border, resolution, resolution)
}

/// Whether a stored height field belongs to a loaded chunk or a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Residency {
    Active,
    Cached,
}

/// Lookup of authoritative height fields by coordinate, active or cached.
pub trait NeighborFields {
    fn field(&self, coords: GridCoord) -> Option<&HeightField>;
    fn field_mut(&mut self, coords: GridCoord) -> Option<(&mut HeightField, Residency)>;
}

/// A chunk's height field with neighbor padding, ready for the erosion kernel.
#[derive(Clone, Debug)]
pub struct HaloMap {
    pub coords: GridCoord,
    pub resolution: usize,
    pub border: usize,
    pub field: HeightField,
}

impl HaloMap {
    /// Assemble the halo for `coords`.
    ///
    /// `seed_field` is the generator's bordered field for the chunk; it stays
    /// visible wherever no neighbor exists.
    pub fn build<S: NeighborFields + ?Sized>(
        coords: GridCoord,
        border: usize,
        seed_field: HeightField,
        store: &S,
    ) -> Result<Self, HaloError> {
        let center = store.field(coords).ok_or(HaloError::MissingCenter { coords })?;
        let resolution = center.width;
        if center.height != resolution {
            return Err(HaloError::SizeMismatch { coords, expected: resolution, actual: center.height });
        }

        let size = resolution + 2 * border;
        if seed_field.width != size || seed_field.height != size {
            return Err(HaloError::SeedMismatch { expected: size, actual: seed_field.width });
        }

        let mut field = seed_field;
        field.copy_rect_from(center, Rect::new(0, 0, resolution, resolution), border, border);

        if border > 0 {
            for (dir, neighbor) in coords.neighbors() {
                let Some(source) = store.field(neighbor) else {
                    continue;
                };
                if source.width != resolution || source.height != resolution {
                    warn!("Skipping halo strip from {}: {}x{} field", neighbor, source.width, source.height);
                    continue;
                }
                let copy = build_copy(dir, resolution, border);
                field.copy_rect_from(source, copy.source, copy.dest.0, copy.dest.1);
            }
        }

        Ok(Self { coords, resolution, border, field })
    }

    pub fn bordered_resolution(&self) -> usize {
        self.resolution + 2 * self.border
    }

    pub fn interior(&self) -> Rect {
        center_rect(self.resolution, self.border)
    }

    /// Write the simulated halo back: the center into the chunk, each strip
    /// into its neighbor.
    ///
    /// Returns the active neighbors whose edge actually changed. A neighbor
    /// that was written but left bit-identical is not reported, so passes
    /// with nothing to move settle instead of re-queueing each other forever.
    /// Cached neighbors are updated in place but never reported.
    pub fn deconstruct<S: NeighborFields + ?Sized>(&self, store: &mut S) -> Result<Vec<GridCoord>, HaloError> {
        let res = self.resolution;
        let (center, _) = store
            .field_mut(self.coords)
            .ok_or(HaloError::MissingCenter { coords: self.coords })?;
        if center.width != res || center.height != res {
            return Err(HaloError::SizeMismatch { coords: self.coords, expected: res, actual: center.width });
        }
        center.copy_rect_from(&self.field, self.interior(), 0, 0);

        let mut dirtied = Vec::new();
        if self.border == 0 {
            return Ok(dirtied);
        }

        for (dir, neighbor) in self.coords.neighbors() {
            let Some((target, residency)) = store.field_mut(neighbor) else {
                continue;
            };
            if target.width != res || target.height != res {
                continue;
            }
            let copy = deconstruct_copy(dir, res, self.border);
            if target.rect_equals(copy.dest_rect(), &self.field, copy.source) {
                continue;
            }
            target.copy_rect_from(&self.field, copy.source, copy.dest.0, copy.dest.1);
            if residency == Residency::Active {
                dirtied.push(neighbor);
            }
        }

        Ok(dirtied)
    }
}
