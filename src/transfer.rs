//! Routing of particles that left a chunk during erosion.
//!
//! Each outgoing particle is moved into the halo frame of the chunk it
//! entered and delivered either to that chunk's inbox (if it is loaded) or
//! to the unloaded-chunk cache. No particle is dropped here.

use std::collections::BTreeMap;

use log::error;

use crate::grid::{Direction, GridCoord};
use crate::particle::Particle;

/// Destination for routed particles.
pub trait ParticleSink {
    fn is_active(&self, coords: GridCoord) -> bool;

    /// Append to the inbox of a loaded chunk.
    fn deliver_to_chunk(&mut self, coords: GridCoord, particles: Vec<Particle>);

    /// Append to the pending list of an inactive coordinate, creating its
    /// cache entry if needed.
    fn deliver_to_cache(&mut self, coords: GridCoord, particles: Vec<Particle>);
}

/// Summary of one routing pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub to_active: usize,
    pub to_cache: usize,
    /// Destination coordinates in the order they were delivered to
    pub destinations: Vec<GridCoord>,
    /// Particles without an exit direction; they are not routed
    pub misrouted: usize,
}

/// Route `outgoing` particles from `source` to their neighbors.
///
/// Particles are grouped per exit direction and delivered in `Direction`
/// order, keeping their relative order within each group.
pub fn process_transfers<S: ParticleSink + ?Sized>(
    source: GridCoord,
    resolution: usize,
    outgoing: Vec<Particle>,
    sink: &mut S,
) -> TransferReport {
    let mut report = TransferReport::default();
    let mut groups: BTreeMap<Direction, Vec<Particle>> = BTreeMap::new();

    for mut particle in outgoing {
        let Some(dir) = particle.exit.direction() else {
            report.misrouted += 1;
            continue;
        };
        particle.rebase(dir, resolution);
        groups.entry(dir).or_default().push(particle.arrived());
    }

    if report.misrouted > 0 {
        error!("{} particles from {} had no exit direction", report.misrouted, source);
    }

    for (dir, particles) in groups {
        let target = source.neighbor(dir);
        let count = particles.len();
        if sink.is_active(target) {
            sink.deliver_to_chunk(target, particles);
            report.to_active += count;
        } else {
            sink.deliver_to_cache(target, particles);
            report.to_cache += count;
        }
        report.destinations.push(target);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::ExitStatus;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct MockSink {
        active: HashSet<GridCoord>,
        inboxes: HashMap<GridCoord, Vec<Particle>>,
        cached: HashMap<GridCoord, Vec<Particle>>,
    }

    impl ParticleSink for MockSink {
        fn is_active(&self, coords: GridCoord) -> bool {
            self.active.contains(&coords)
        }

        fn deliver_to_chunk(&mut self, coords: GridCoord, particles: Vec<Particle>) {
            self.inboxes.entry(coords).or_default().extend(particles);
        }

        fn deliver_to_cache(&mut self, coords: GridCoord, particles: Vec<Particle>) {
            self.cached.entry(coords).or_default().extend(particles);
        }
    }

    fn exited(x: f32, y: f32, dir: Direction) -> Particle {
        let mut p = Particle::new(x, y, 1.0, 1.0, 0);
        p.exit = ExitStatus::Exited(dir);
        p
    }

    #[test]
    fn test_partitions_between_active_and_cache() {
        let source = GridCoord::new(0, 0);
        let mut sink = MockSink::default();
        sink.active.insert(GridCoord::new(1, 0));

        let outgoing = vec![
            exited(37.5, 10.0, Direction::East),
            exited(2.0, 10.0, Direction::West),
            exited(38.0, 12.0, Direction::East),
            exited(38.0, 38.0, Direction::NorthEast),
        ];
        let report = process_transfers(source, 33, outgoing, &mut sink);

        assert_eq!(report.to_active, 2);
        assert_eq!(report.to_cache, 2);
        assert_eq!(report.misrouted, 0);

        let east = &sink.inboxes[&GridCoord::new(1, 0)];
        assert_eq!(east[0].position, [4.5, 10.0]);
        assert_eq!(east[1].position, [5.0, 12.0]);
        assert!(east.iter().all(|p| p.exit == ExitStatus::InChunk));

        assert_eq!(sink.cached[&GridCoord::new(-1, 0)][0].position, [35.0, 10.0]);
        assert_eq!(sink.cached[&GridCoord::new(1, 1)][0].position, [5.0, 5.0]);
    }

    #[test]
    fn test_conserves_particles() {
        let mut sink = MockSink::default();
        sink.active.insert(GridCoord::new(4, 5));
        let outgoing: Vec<Particle> = Direction::ALL
            .iter()
            .cycle()
            .take(40)
            .map(|&dir| exited(20.0, 20.0, dir))
            .collect();

        let report = process_transfers(GridCoord::new(4, 4), 33, outgoing, &mut sink);
        let delivered: usize = sink.inboxes.values().chain(sink.cached.values()).map(Vec::len).sum();
        assert_eq!(delivered, 40);
        assert_eq!(report.to_active + report.to_cache, 40);
        assert_eq!(report.destinations.len(), 8);
        assert_eq!(sink.inboxes[&GridCoord::new(4, 5)].len(), 5);
    }

    #[test]
    fn test_in_chunk_particles_are_reported() {
        let mut sink = MockSink::default();
        let outgoing = vec![Particle::new(10.0, 10.0, 1.0, 1.0, 0)];
        let report = process_transfers(GridCoord::new(0, 0), 33, outgoing, &mut sink);
        assert_eq!(report.misrouted, 1);
        assert!(sink.inboxes.is_empty() && sink.cached.is_empty());
    }
}
