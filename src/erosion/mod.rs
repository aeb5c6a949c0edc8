//! Particle erosion for halo maps
//!
//! - **Kernels** simulate particles over a halo map and report the ones that
//!   left the chunk: [`CpuKernel`] (deterministic) and [`gpu::GpuKernel`]
//!   (wgpu compute).
//! - **Eroder** prepares each pass: drains the chunk inbox, seeds the chunk's
//!   initial particles once, and filters the kernel output down to exits.

pub mod eroder;
pub mod gpu;
pub mod hydraulic;
pub mod utils;

pub use eroder::{ErodeOutcome, ParticleEroder};
pub use hydraulic::CpuKernel;

use crate::config::ErosionConfig;
use crate::error::KernelError;
use crate::halo::HaloMap;
use crate::particle::Particle;

/// Statistics from erosion passes
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErosionStats {
    pub total_eroded: f64,
    pub total_deposited: f64,
    pub max_erosion: f32,
    pub max_deposition: f32,
    pub steps_taken: usize,
    pub particles_simulated: usize,
    pub particles_exited: usize,
}

impl ErosionStats {
    pub fn merge(&mut self, other: &ErosionStats) {
        self.total_eroded += other.total_eroded;
        self.total_deposited += other.total_deposited;
        self.max_erosion = self.max_erosion.max(other.max_erosion);
        self.max_deposition = self.max_deposition.max(other.max_deposition);
        self.steps_taken += other.steps_taken;
        self.particles_simulated += other.particles_simulated;
        self.particles_exited += other.particles_exited;
    }
}

/// Result of one kernel invocation.
#[derive(Clone, Debug, Default)]
pub struct KernelOutput {
    /// Particles that crossed the chunk boundary, tagged with their exit.
    /// Kernels may also include particles that stayed in the chunk.
    pub particles: Vec<Particle>,
    pub stats: ErosionStats,
}

/// Simulates particles over a halo map, mutating its heights in place.
///
/// Particle positions are in halo space. A particle counts as exited once it
/// is more than its `halo_resilience` cells outside the chunk interior.
pub trait ErosionKernel {
    fn name(&self) -> &'static str;

    fn simulate(
        &mut self,
        halo: &mut HaloMap,
        particles: &[Particle],
        config: &ErosionConfig,
        seed: u64,
    ) -> Result<KernelOutput, KernelError>;
}

/// Pick the GPU kernel if requested and available, otherwise the CPU kernel.
pub fn select_kernel(use_gpu: bool) -> Box<dyn ErosionKernel> {
    if use_gpu {
        match gpu::GpuKernel::new() {
            Ok(kernel) => {
                log::info!("Using GPU erosion kernel");
                return Box::new(kernel);
            }
            Err(e) => log::warn!("{}, falling back to CPU erosion kernel", e),
        }
    }
    Box::new(CpuKernel::new())
}

/// Halo geometry the kernels rely on.
pub(crate) fn check_halo(halo: &HaloMap) -> Result<(), KernelError> {
    let size = halo.bordered_resolution();
    if halo.field.width != size || halo.field.height != size || halo.resolution == 0 {
        return Err(KernelError::InvalidHalo {
            width: halo.field.width,
            height: halo.field.height,
            border: halo.border,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_stats() {
        let mut a = ErosionStats {
            total_eroded: 1.0,
            max_erosion: 0.5,
            particles_simulated: 3,
            ..Default::default()
        };
        let b = ErosionStats {
            total_eroded: 2.0,
            max_erosion: 0.25,
            particles_simulated: 4,
            particles_exited: 1,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.total_eroded, 3.0);
        assert_eq!(a.max_erosion, 0.5);
        assert_eq!(a.particles_simulated, 7);
        assert_eq!(a.particles_exited, 1);
    }
}
