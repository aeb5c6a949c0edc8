//! Per-chunk erosion pass: gathers the particles to simulate, runs the
//! kernel over the chunk's halo map and collects the particles that left.

use log::debug;
use rand::Rng;

use crate::chunk::Chunk;
use crate::config::ErosionConfig;
use crate::erosion::{ErosionKernel, ErosionStats};
use crate::error::KernelError;
use crate::grid::GridCoord;
use crate::halo::HaloMap;
use crate::particle::{ExitStatus, Particle};
use crate::seeds::{kernel_seed, particle_rng};

/// What one erosion pass produced.
#[derive(Clone, Debug, Default)]
pub struct ErodeOutcome {
    /// Particles that crossed the chunk boundary, in halo coordinates of the
    /// source chunk and tagged with their exit direction
    pub outgoing: Vec<Particle>,
    /// Particles handed to the kernel (inbox plus freshly seeded)
    pub simulated: usize,
    /// Of those, how many were seeded in this pass
    pub seeded: usize,
    pub stats: ErosionStats,
}

/// Deterministic initial particles for a chunk.
///
/// Positions are whole cells inside the chunk interior of its halo; the RNG
/// comes from the chunk coordinate and world seed only.
pub fn seed_particles(
    coords: GridCoord,
    world_seed: i32,
    config: &ErosionConfig,
    resolution: usize,
    border: usize,
) -> Vec<Particle> {
    let resilience_range = config.resilience_range();
    let mut rng = particle_rng(coords, world_seed);

    (0..config.num_erosion_iterations)
        .map(|_| {
            let x = rng.gen_range(border..resolution + border) as f32;
            let y = rng.gen_range(border..resolution + border) as f32;
            let resilience = rng.gen_range(0..resilience_range);
            Particle::new(x, y, config.start_speed, config.start_water, resilience)
        })
        .collect()
}

/// Drives an [`ErosionKernel`] for one chunk at a time.
pub struct ParticleEroder {
    kernel: Box<dyn ErosionKernel>,
}

impl ParticleEroder {
    pub fn new(kernel: Box<dyn ErosionKernel>) -> Self {
        Self { kernel }
    }

    pub fn kernel_name(&self) -> &'static str {
        self.kernel.name()
    }

    /// Erode `chunk` through its halo map.
    ///
    /// The chunk's inbox is consumed and, the first time a chunk is eroded,
    /// its initial particles are seeded. On kernel failure the inbox and the
    /// seeding flag are restored so the pass can be retried.
    pub fn erode(
        &mut self,
        chunk: &mut Chunk,
        halo: &mut HaloMap,
        world_seed: i32,
        config: &ErosionConfig,
    ) -> Result<ErodeOutcome, KernelError> {
        let incoming = chunk.inbox.drain();
        let inbox_len = incoming.len();
        let mut particles = incoming;

        let seeding = !chunk.initial_particles_dropped;
        let mut seeded = 0;
        if seeding {
            let initial = seed_particles(chunk.coords, world_seed, config, halo.resolution, halo.border);
            seeded = initial.len();
            particles.extend(initial);
            chunk.initial_particles_dropped = true;
        }

        if particles.is_empty() {
            return Ok(ErodeOutcome::default());
        }

        debug!(
            "Eroding {} with {} particles ({} incoming, {} seeded) on {}",
            chunk.coords,
            particles.len(),
            inbox_len,
            seeded,
            self.kernel.name()
        );

        let seed = kernel_seed(chunk.coords, world_seed);
        let output = match self.kernel.simulate(halo, &particles, config, seed) {
            Ok(output) => output,
            Err(e) => {
                particles.truncate(inbox_len);
                chunk.inbox.extend(particles);
                if seeding {
                    chunk.initial_particles_dropped = false;
                }
                return Err(e);
            }
        };

        let simulated = particles.len();
        let outgoing: Vec<Particle> = output
            .particles
            .into_iter()
            .filter(|p| p.exit != ExitStatus::InChunk)
            .collect();

        Ok(ErodeOutcome {
            outgoing,
            simulated,
            seeded,
            stats: output.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erosion::{CpuKernel, KernelOutput};
    use crate::tilemap::Tilemap;

    fn config() -> ErosionConfig {
        ErosionConfig {
            num_erosion_iterations: 300,
            erosion_brush_radius: 2,
            halo_zone_width: 4,
            ..Default::default()
        }
    }

    fn setup(coords: GridCoord) -> (Chunk, HaloMap) {
        let resolution = 33;
        let border = config().border_size();
        let size = resolution + 2 * border;
        let mut field = Tilemap::new_with(size, size, 0.0f32);
        for (x, y, h) in field.iter_mut() {
            *h = ((x as f32 * 0.3).sin() + (y as f32 * 0.2).cos()) * 4.0 + x as f32 * 0.1;
        }
        let chunk = Chunk::new(coords, field.sub_rect(crate::halo::center_rect(resolution, border)), 1000);
        (chunk, HaloMap { coords, resolution, border, field })
    }

    struct FailingKernel;

    impl ErosionKernel for FailingKernel {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn simulate(&mut self, _: &mut HaloMap, _: &[Particle], _: &ErosionConfig, _: u64) -> Result<KernelOutput, KernelError> {
            Err(KernelError::Readback { message: "lost device".to_string() })
        }
    }

    #[test]
    fn test_seeding_is_deterministic() {
        let coords = GridCoord::new(3, -2);
        let a = seed_particles(coords, 42, &config(), 33, 4);
        let b = seed_particles(coords, 42, &config(), 33, 4);
        assert_eq!(a, b);
        assert_eq!(a.len(), 300);

        let border = 4.0;
        for p in &a {
            assert!(p.position[0] >= border && p.position[0] < border + 33.0);
            assert!(p.position[1] >= border && p.position[1] < border + 33.0);
            assert!(p.halo_resilience >= 0 && p.halo_resilience < config().resilience_range());
        }

        assert_ne!(a, seed_particles(coords, 43, &config(), 33, 4));
    }

    #[test]
    fn test_erode_is_deterministic() {
        let coords = GridCoord::new(3, -2);
        let (mut chunk_a, mut halo_a) = setup(coords);
        let (mut chunk_b, mut halo_b) = setup(coords);

        let out_a = ParticleEroder::new(Box::new(CpuKernel::new()))
            .erode(&mut chunk_a, &mut halo_a, 42, &config())
            .unwrap();
        let out_b = ParticleEroder::new(Box::new(CpuKernel::new()))
            .erode(&mut chunk_b, &mut halo_b, 42, &config())
            .unwrap();

        assert_eq!(out_a.outgoing, out_b.outgoing);
        assert_eq!(halo_a.field, halo_b.field);
        assert_eq!(out_a.seeded, 300);
        assert!(out_a.outgoing.iter().all(|p| p.exit != ExitStatus::InChunk));
    }

    #[test]
    fn test_initial_particles_seeded_once() {
        let (mut chunk, mut halo) = setup(GridCoord::new(0, 0));
        let mut eroder = ParticleEroder::new(Box::new(CpuKernel::new()));

        let first = eroder.erode(&mut chunk, &mut halo, 1, &config()).unwrap();
        assert_eq!(first.seeded, 300);
        assert!(chunk.initial_particles_dropped);

        let second = eroder.erode(&mut chunk, &mut halo, 1, &config()).unwrap();
        assert_eq!(second.seeded, 0);
        assert_eq!(second.simulated, 0);
    }

    #[test]
    fn test_kernel_failure_restores_inbox() {
        let (mut chunk, mut halo) = setup(GridCoord::new(0, 0));
        chunk.inbox.extend(vec![Particle::new(10.0, 10.0, 1.0, 1.0, 0); 5]);

        let mut eroder = ParticleEroder::new(Box::new(FailingKernel));
        assert!(eroder.erode(&mut chunk, &mut halo, 1, &config()).is_err());
        assert_eq!(chunk.inbox.len(), 5);
        assert!(!chunk.initial_particles_dropped);
    }
}
