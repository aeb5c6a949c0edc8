//! Active chunks and their particle inboxes.

use std::collections::VecDeque;

use crate::grid::{Direction, GridCoord};
use crate::particle::Particle;
use crate::tilemap::HeightField;

/// Bounded FIFO of particles waiting to be simulated in one chunk.
///
/// When full, pushing drops the oldest particles so the newest always fit.
#[derive(Clone, Debug)]
pub struct Inbox {
    particles: VecDeque<Particle>,
    capacity: usize,
}

impl Inbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            particles: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append particles in order. Returns how many old particles were dropped.
    pub fn extend<I: IntoIterator<Item = Particle>>(&mut self, incoming: I) -> usize {
        self.particles.extend(incoming);
        let overflow = self.particles.len().saturating_sub(self.capacity);
        if overflow > 0 {
            self.particles.drain(..overflow);
        }
        overflow
    }

    /// Take every waiting particle, oldest first.
    pub fn drain(&mut self) -> Vec<Particle> {
        self.particles.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.particles.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.particles.iter()
    }
}

/// A loaded tile of the world.
#[derive(Clone, Debug)]
pub struct Chunk {
    pub coords: GridCoord,
    /// The authoritative heights for this tile
    pub height_field: HeightField,
    pub is_dirty: bool,
    /// Neighbor coordinates that are currently active, indexed by `Direction::index`
    neighbors: [Option<GridCoord>; 8],
    pub inbox: Inbox,
    pub initial_particles_dropped: bool,
}

impl Chunk {
    pub fn new(coords: GridCoord, height_field: HeightField, inbox_capacity: usize) -> Self {
        Self {
            coords,
            height_field,
            is_dirty: false,
            neighbors: [None; 8],
            inbox: Inbox::new(inbox_capacity),
            initial_particles_dropped: false,
        }
    }

    pub fn resolution(&self) -> usize {
        self.height_field.width
    }

    pub fn neighbor(&self, dir: Direction) -> Option<GridCoord> {
        self.neighbors[dir.index()]
    }

    /// Active neighbors as `(direction, coords)`.
    pub fn linked_neighbors(&self) -> impl Iterator<Item = (Direction, GridCoord)> + '_ {
        Direction::ALL
            .into_iter()
            .filter_map(move |dir| self.neighbors[dir.index()].map(|c| (dir, c)))
    }

    pub(crate) fn link(&mut self, dir: Direction) {
        self.neighbors[dir.index()] = Some(self.coords.neighbor(dir));
    }

    pub(crate) fn unlink(&mut self, dir: Direction) {
        self.neighbors[dir.index()] = None;
    }

    pub fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.height_field.as_slice().len() * std::mem::size_of::<f32>()
            + self.inbox.len() * std::mem::size_of::<Particle>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle(tag: f32) -> Particle {
        Particle::new(tag, 0.0, 1.0, 1.0, 0)
    }

    #[test]
    fn test_inbox_keeps_newest_on_overflow() {
        let mut inbox = Inbox::new(3);
        assert_eq!(inbox.extend((0..2).map(|i| particle(i as f32))), 0);
        assert_eq!(inbox.extend((2..5).map(|i| particle(i as f32))), 2);

        let kept: Vec<f32> = inbox.drain().iter().map(|p| p.position[0]).collect();
        assert_eq!(kept, vec![2.0, 3.0, 4.0]);
        assert!(inbox.is_empty());
    }

    #[test]
    fn test_links_point_at_neighbor_coords() {
        let mut chunk = Chunk::new(GridCoord::new(2, 2), HeightField::new(33, 33), 10);
        chunk.link(Direction::NorthWest);
        assert_eq!(chunk.neighbor(Direction::NorthWest), Some(GridCoord::new(1, 3)));
        assert_eq!(chunk.linked_neighbors().count(), 1);
        chunk.unlink(Direction::NorthWest);
        assert_eq!(chunk.neighbor(Direction::NorthWest), None);
    }
}
