//! Procedural terrain for chunks.
//!
//! Generators sample a single global height function, so a chunk generated
//! with a border overlaps its neighbors' cells exactly. Cell `(i, j)` of chunk
//! `(cx, cy)` lives at global cell `(cx * resolution + i, cy * resolution + j)`.

use noise::Perlin;
use rayon::prelude::*;

use crate::config::TerrainConfig;
use crate::error::GeneratorError;
use crate::grid::GridCoord;
use crate::seeds::noise_seed;
use crate::tilemap::{fbm_noise, HeightField, Tilemap};

/// Produces height fields for chunk coordinates.
///
/// The result is `(resolution + 2 * border)` cells wide; for a fixed input the
/// output must always be the same.
pub trait TerrainGenerator {
    fn generate(
        &mut self,
        coords: GridCoord,
        resolution: usize,
        border: usize,
        world_seed: i32,
    ) -> Result<HeightField, GeneratorError>;
}

impl<F> TerrainGenerator for F
where
    F: FnMut(GridCoord, usize, usize, i32) -> Result<HeightField, GeneratorError>,
{
    fn generate(
        &mut self,
        coords: GridCoord,
        resolution: usize,
        border: usize,
        world_seed: i32,
    ) -> Result<HeightField, GeneratorError> {
        self(coords, resolution, border, world_seed)
    }
}

/// Global cell index of the first (bottom-left) cell of a bordered field.
pub fn field_origin(coords: GridCoord, resolution: usize, border: usize) -> (i64, i64) {
    let res = resolution as i64;
    let b = border as i64;
    (coords.x as i64 * res - b, coords.y as i64 * res - b)
}

/// Fractal Perlin terrain.
///
/// Holds the permutation table for the last seed it saw and rebuilds it only
/// when asked for a different seed.
pub struct FbmGenerator {
    config: TerrainConfig,
    noise_cache: Option<(i32, Perlin)>,
    rebuilds: usize,
}

impl FbmGenerator {
    pub fn new(config: TerrainConfig) -> Self {
        Self {
            config,
            noise_cache: None,
            rebuilds: 0,
        }
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Number of times the permutation table was built.
    pub fn noise_rebuilds(&self) -> usize {
        self.rebuilds
    }

    fn noise_for(&mut self, world_seed: i32) -> Perlin {
        match &self.noise_cache {
            Some((seed, perlin)) if *seed == world_seed => perlin.clone(),
            _ => {
                let perlin = Perlin::new(noise_seed(world_seed));
                self.rebuilds += 1;
                self.noise_cache = Some((world_seed, perlin.clone()));
                perlin
            }
        }
    }

    /// Height at a global cell.
    fn sample(config: &TerrainConfig, noise: &Perlin, gx: i64, gy: i64) -> f32 {
        let nx = (gx as f64 + config.offset[0]) * config.x_scale * config.scale;
        let ny = (gy as f64 + config.offset[1]) * config.y_scale * config.scale;
        let n = fbm_noise(noise, nx, ny, config.octaves, config.persistence, config.lacunarity).clamp(-1.0, 1.0);
        // Shift from [-1, 1] to [0, height_scale]
        ((n * 0.5 + 0.5) as f32) * config.height_scale
    }
}

impl Default for FbmGenerator {
    fn default() -> Self {
        Self::new(TerrainConfig::default())
    }
}

impl TerrainGenerator for FbmGenerator {
    fn generate(
        &mut self,
        coords: GridCoord,
        resolution: usize,
        border: usize,
        world_seed: i32,
    ) -> Result<HeightField, GeneratorError> {
        if resolution == 0 {
            return Err(GeneratorError::InvalidResolution { coords, resolution });
        }

        let size = resolution + 2 * border;
        let (ox, oy) = field_origin(coords, resolution, border);
        let config = self.config.clone();
        let noise = self.noise_for(world_seed);

        let mut field: HeightField = Tilemap::new(size, size);
        field.as_mut_slice().par_chunks_mut(size).enumerate().for_each(|(j, row)| {
            for (i, cell) in row.iter_mut().enumerate() {
                *cell = Self::sample(&config, &noise, ox + i as i64, oy + j as i64);
            }
        });

        if !field.is_finite() {
            return Err(GeneratorError::NonFinite { coords });
        }
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tilemap::Rect;

    fn small_config() -> TerrainConfig {
        TerrainConfig {
            octaves: 4,
            x_scale: 0.05,
            y_scale: 0.05,
            ..Default::default()
        }
    }

    #[test]
    fn test_deterministic() {
        let mut a = FbmGenerator::new(small_config());
        let mut b = FbmGenerator::new(small_config());
        let fa = a.generate(GridCoord::new(3, -2), 33, 4, 42).unwrap();
        let fb = b.generate(GridCoord::new(3, -2), 33, 4, 42).unwrap();
        assert_eq!(fa, fb);
        assert_eq!(fa.width, 41);
    }

    #[test]
    fn test_heights_within_scale() {
        let mut gen = FbmGenerator::new(small_config());
        let field = gen.generate(GridCoord::new(0, 0), 33, 0, 1).unwrap();
        let (lo, hi) = field.min_max();
        assert!(lo >= 0.0 && hi <= 3.0, "{} {}", lo, hi);
        assert!(hi > lo);
    }

    #[test]
    fn test_border_overlaps_neighbor() {
        let mut gen = FbmGenerator::new(small_config());
        let res = 33;
        let b = 4;
        let bordered = gen.generate(GridCoord::new(0, 0), res, b, 9).unwrap();
        let east = gen.generate(GridCoord::new(1, 0), res, 0, 9).unwrap();

        // First b columns of the east chunk sit in the bordered field's right padding
        assert!(bordered.rect_equals(
            Rect::new(b + res, b, b, res),
            &east,
            Rect::new(0, 0, b, res),
        ));
    }

    #[test]
    fn test_noise_cache_invalidated_on_seed_change() {
        let mut gen = FbmGenerator::new(small_config());
        gen.generate(GridCoord::new(0, 0), 33, 0, 1).unwrap();
        gen.generate(GridCoord::new(1, 0), 33, 0, 1).unwrap();
        assert_eq!(gen.noise_rebuilds(), 1);
        gen.generate(GridCoord::new(0, 0), 33, 0, 2).unwrap();
        assert_eq!(gen.noise_rebuilds(), 2);
    }

    #[test]
    fn test_zero_resolution_is_an_error() {
        let mut gen = FbmGenerator::default();
        assert!(matches!(
            gen.generate(GridCoord::new(0, 0), 0, 0, 0),
            Err(GeneratorError::InvalidResolution { .. })
        ));
    }
}
