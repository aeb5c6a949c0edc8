//! Hydraulic erosion simulation using particle-based water droplets.
//!
//! Each particle follows the terrain gradient of a halo map, picking up
//! sediment on steep slopes and depositing it when the flow slows down or
//! climbs. Particles that wander past the chunk interior by more than their
//! halo resilience stop and are handed back to the caller, still carrying
//! their water, speed and sediment.
//!
//! The CPU kernel runs particles sequentially in input order, so a pass is
//! fully determined by the halo, the particle list and the seed.

use std::collections::HashMap;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::ErosionConfig;
use crate::erosion::utils::{apply_erosion_brush, create_erosion_brush, deposit_bilinear, height_and_gradient, Brush};
use crate::erosion::{check_halo, ErosionKernel, ErosionStats, KernelOutput};
use crate::error::KernelError;
use crate::halo::HaloMap;
use crate::particle::{ExitStatus, Particle};
use crate::tilemap::HeightField;

/// Sequential erosion kernel.
#[derive(Default)]
pub struct CpuKernel {
    brushes: HashMap<usize, Brush>,
}

impl CpuKernel {
    pub fn new() -> Self {
        Self::default()
    }

    fn brush(&mut self, radius: usize) -> &Brush {
        self.brushes.entry(radius).or_insert_with(|| create_erosion_brush(radius))
    }
}

impl ErosionKernel for CpuKernel {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn simulate(
        &mut self,
        halo: &mut HaloMap,
        particles: &[Particle],
        config: &ErosionConfig,
        seed: u64,
    ) -> Result<KernelOutput, KernelError> {
        check_halo(halo)?;

        let border = halo.border;
        let resolution = halo.resolution;
        let brush = self.brush(config.erosion_brush_radius).clone();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut stats = ErosionStats::default();
        let mut exited = Vec::new();

        for start in particles {
            stats.particles_simulated += 1;
            let mut particle = *start;
            particle.exit = ExitStatus::InChunk;

            if run_particle(&mut halo.field, &mut particle, &brush, config, border, resolution, &mut rng, &mut stats) {
                stats.particles_exited += 1;
                exited.push(particle);
            }
        }

        Ok(KernelOutput { particles: exited, stats })
    }
}

/// Simulate one particle until it dies or exits.
/// Returns true if it left the chunk; its `exit` tag is set accordingly.
///
/// Algorithm:
/// 1. Sample height and gradient at the current position
/// 2. Blend the previous direction with the downhill gradient (inertia)
/// 3. Move one cell; stop if the particle exited the chunk
/// 4. Compare the new height against the sediment capacity:
///    a. Climbing or over capacity: deposit at the previous position
///    b. Otherwise: erode around the previous cell with the brush
/// 5. Update speed from the height change and evaporate water
/// 6. On death, drop whatever sediment is left
#[allow(clippy::too_many_arguments)]
fn run_particle(
    field: &mut HeightField,
    particle: &mut Particle,
    brush: &[(i32, i32, f32)],
    config: &ErosionConfig,
    border: usize,
    resolution: usize,
    rng: &mut ChaCha8Rng,
    stats: &mut ErosionStats,
) -> bool {
    let inertia = config.inertia;

    while particle.age < config.max_lifetime {
        let [old_x, old_y] = particle.position;
        let (old_height, grad_x, grad_y) = height_and_gradient(field, old_x, old_y);

        let mut dir_x = particle.direction[0] * inertia - grad_x * (1.0 - inertia);
        let mut dir_y = particle.direction[1] * inertia - grad_y * (1.0 - inertia);
        let len = (dir_x * dir_x + dir_y * dir_y).sqrt();
        if len > 0.0001 {
            dir_x /= len;
            dir_y /= len;
        } else {
            // No gradient (flat area or local minimum) - pick random direction
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            dir_x = angle.cos();
            dir_y = angle.sin();
        }

        particle.direction = [dir_x, dir_y];
        particle.position = [old_x + dir_x, old_y + dir_y];
        particle.age += 1;
        stats.steps_taken += 1;

        let exit = particle.classify_exit(border, resolution);
        if exit != ExitStatus::InChunk {
            particle.exit = exit;
            return true;
        }

        let (new_height, _, _) = height_and_gradient(field, particle.position[0], particle.position[1]);
        let delta_height = new_height - old_height;
        if !delta_height.is_finite() {
            break;
        }

        let capacity = (-delta_height * particle.speed * particle.water * config.sediment_capacity_factor)
            .max(config.min_sediment_capacity);

        if particle.sediment > capacity || delta_height > 0.0 {
            // Fill the pit when climbing, otherwise drop a share of the excess
            let deposit_amount = if delta_height > 0.0 {
                delta_height.min(particle.sediment)
            } else {
                (particle.sediment - capacity) * config.deposit_speed
            };
            if deposit_amount > 0.0 {
                particle.sediment -= deposit_amount;
                deposit_bilinear(field, old_x, old_y, deposit_amount);
                stats.total_deposited += deposit_amount as f64;
                stats.max_deposition = stats.max_deposition.max(deposit_amount);
            }
        } else {
            // Never erode deeper than the height difference
            let erode_amount = ((capacity - particle.sediment) * config.erode_speed).min(-delta_height);
            if erode_amount > 0.0 {
                let cell_x = old_x.max(0.0) as usize;
                let cell_y = old_y.max(0.0) as usize;
                let removed = apply_erosion_brush(field, brush, cell_x, cell_y, erode_amount);
                particle.sediment += removed;
                stats.total_eroded += removed as f64;
                stats.max_erosion = stats.max_erosion.max(removed);
            }
        }

        // Accelerate going downhill
        particle.speed = (particle.speed * particle.speed - delta_height * config.gravity).max(0.0).sqrt();
        particle.water *= 1.0 - config.evaporate_speed;
    }

    // Died inside the chunk
    if particle.sediment > 0.0 {
        let [x, y] = particle.position;
        deposit_bilinear(field, x, y, particle.sediment);
        stats.total_deposited += particle.sediment as f64;
        particle.sediment = 0.0;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Direction, GridCoord};
    use crate::tilemap::Tilemap;

    fn sloped_halo(resolution: usize, border: usize) -> HaloMap {
        let size = resolution + 2 * border;
        let mut field = Tilemap::new_with(size, size, 0.0f32);
        for (x, y, h) in field.iter_mut() {
            // Slope from bottom-left (high) to top-right (low)
            *h = (size as f32 - x as f32) * 0.5 + (size as f32 - y as f32) * 0.5;
        }
        HaloMap { coords: GridCoord::new(0, 0), resolution, border, field }
    }

    fn config() -> ErosionConfig {
        ErosionConfig {
            erosion_brush_radius: 2,
            halo_zone_width: 4,
            ..Default::default()
        }
    }

    fn particles(n: usize, resolution: usize, border: usize) -> Vec<Particle> {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        (0..n)
            .map(|_| {
                let x = rng.gen_range(border..resolution + border) as f32;
                let y = rng.gen_range(border..resolution + border) as f32;
                Particle::new(x, y, 1.0, 1.0, 0)
            })
            .collect()
    }

    #[test]
    fn test_droplet_erodes_slope() {
        let mut halo = sloped_halo(33, 4);
        let before = halo.field.clone();
        let mut kernel = CpuKernel::new();
        let output = kernel.simulate(&mut halo, &particles(200, 33, 4), &config(), 1).unwrap();

        assert!(output.stats.total_eroded > 0.0);
        assert_eq!(output.stats.particles_simulated, 200);
        assert_ne!(halo.field, before);
    }

    #[test]
    fn test_same_seed_same_result() {
        let start = particles(100, 33, 4);
        let mut a = sloped_halo(33, 4);
        let mut b = sloped_halo(33, 4);
        let out_a = CpuKernel::new().simulate(&mut a, &start, &config(), 99).unwrap();
        let out_b = CpuKernel::new().simulate(&mut b, &start, &config(), 99).unwrap();

        assert_eq!(a.field, b.field);
        assert_eq!(out_a.particles, out_b.particles);
        assert_eq!(out_a.stats, out_b.stats);
    }

    #[test]
    fn test_particle_pushed_off_east_edge_is_tagged() {
        let resolution = 33;
        let border = 4;
        let size = resolution + 2 * border;
        // Steep drop towards +x
        let mut field = Tilemap::new_with(size, size, 0.0f32);
        for (x, _, h) in field.iter_mut() {
            *h = (size - x) as f32 * 2.0;
        }
        let mut halo = HaloMap { coords: GridCoord::new(0, 0), resolution, border, field };

        let start = vec![Particle::new(34.0, 20.0, 1.0, 1.0, 0)];
        let output = CpuKernel::new().simulate(&mut halo, &start, &config(), 3).unwrap();

        assert_eq!(output.particles.len(), 1);
        let p = output.particles[0];
        assert_eq!(p.exit, ExitStatus::Exited(Direction::East));
        assert!(p.position[0] >= (border + resolution) as f32);
        assert!(p.age > 0);
    }

    #[test]
    fn test_exhausted_particle_deposits_and_stays() {
        let mut halo = sloped_halo(33, 4);
        let mut p = Particle::new(20.0, 20.0, 1.0, 1.0, 0);
        p.age = config().max_lifetime;
        p.sediment = 0.5;
        let before = halo.field.sum();

        let output = CpuKernel::new().simulate(&mut halo, &[p], &config(), 0).unwrap();
        assert!(output.particles.is_empty());
        assert!((halo.field.sum() - before - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_rejects_malformed_halo() {
        let mut halo = sloped_halo(33, 4);
        halo.border = 5;
        let result = CpuKernel::new().simulate(&mut halo, &[], &config(), 0);
        assert!(matches!(result, Err(KernelError::InvalidHalo { .. })));
    }
}
