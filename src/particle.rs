//! Erosion particles and their exit tagging.

use crate::grid::Direction;

/// Where a particle ended up after a kernel pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// Still inside the chunk, or died there
    #[default]
    InChunk,
    /// Left the chunk through this side or corner
    Exited(Direction),
}

impl ExitStatus {
    pub fn direction(self) -> Option<Direction> {
        match self {
            ExitStatus::InChunk => None,
            ExitStatus::Exited(dir) => Some(dir),
        }
    }
}

/// A water particle. Positions are in the halo frame of the chunk that
/// currently owns the particle: `(border, border)` is the chunk's first cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub position: [f32; 2],
    pub direction: [f32; 2],
    pub speed: f32,
    pub water: f32,
    pub sediment: f32,
    /// Steps taken so far, carried across chunks
    pub age: i32,
    /// Cells a particle may wander past the chunk edge before it is handed off
    pub halo_resilience: i32,
    pub exit: ExitStatus,
}

impl Particle {
    pub fn new(x: f32, y: f32, speed: f32, water: f32, halo_resilience: i32) -> Self {
        Self {
            position: [x, y],
            direction: [0.0, 0.0],
            speed,
            water,
            sediment: 0.0,
            age: 0,
            halo_resilience,
            exit: ExitStatus::InChunk,
        }
    }

    /// Move the particle into the halo frame of the neighbor it exited to.
    /// Both frames share the same border width, so only the chunk stride changes.
    pub fn rebase(&mut self, dir: Direction, resolution: usize) {
        let (dx, dy) = dir.offset();
        self.position[0] -= (dx * resolution as i32) as f32;
        self.position[1] -= (dy * resolution as i32) as f32;
    }

    /// Which side of the interior `[border, border + resolution)` the particle
    /// has left by more than its resilience, if any.
    pub fn classify_exit(&self, border: usize, resolution: usize) -> ExitStatus {
        let slack = self.halo_resilience.max(0) as f32;
        let lo = border as f32 - slack;
        let hi = (border + resolution) as f32 + slack;

        let side = |v: f32| -> i32 {
            if v < lo {
                -1
            } else if v >= hi {
                1
            } else {
                0
            }
        };

        match Direction::from_offset(side(self.position[0]), side(self.position[1])) {
            Some(dir) => ExitStatus::Exited(dir),
            None => ExitStatus::InChunk,
        }
    }

    /// Hand-off bookkeeping: clear the tag once the particle is queued in its new chunk.
    pub fn arrived(mut self) -> Self {
        self.exit = ExitStatus::InChunk;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sides_and_corners() {
        let border = 4;
        let res = 33;
        let mut p = Particle::new(20.0, 20.0, 1.0, 1.0, 0);
        assert_eq!(p.classify_exit(border, res), ExitStatus::InChunk);

        p.position = [37.0, 20.0];
        assert_eq!(p.classify_exit(border, res), ExitStatus::Exited(Direction::East));

        p.position = [3.5, 20.0];
        assert_eq!(p.classify_exit(border, res), ExitStatus::Exited(Direction::West));

        p.position = [37.2, 37.2];
        assert_eq!(p.classify_exit(border, res), ExitStatus::Exited(Direction::NorthEast));

        p.position = [2.0, 1.0];
        assert_eq!(p.classify_exit(border, res), ExitStatus::Exited(Direction::SouthWest));
    }

    #[test]
    fn test_resilience_delays_exit() {
        let mut p = Particle::new(38.0, 20.0, 1.0, 1.0, 2);
        assert_eq!(p.classify_exit(4, 33), ExitStatus::InChunk);
        p.position[0] = 39.0;
        assert_eq!(p.classify_exit(4, 33), ExitStatus::Exited(Direction::East));
    }

    #[test]
    fn test_rebase_lands_inside_neighbor() {
        let border = 4;
        let res = 33;
        let mut p = Particle::new(37.5, 10.0, 1.0, 1.0, 0);
        let dir = p.classify_exit(border, res).direction().unwrap();
        p.rebase(dir, res);
        assert_eq!(p.position, [4.5, 10.0]);
        assert_eq!(p.classify_exit(border, res), ExitStatus::InChunk);

        let mut q = Particle::new(10.0, 3.0, 1.0, 1.0, 0);
        q.rebase(Direction::South, res);
        assert_eq!(q.position, [10.0, 36.0]);
    }
}
