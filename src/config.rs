//! World, erosion and terrain configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Chunk resolutions accepted by the world: `2^n + 1` for n in 5..=12.
pub const HEIGHTMAP_RESOLUTIONS: [usize; 8] = [33, 65, 129, 257, 513, 1025, 2049, 4097];

pub fn is_valid_resolution(resolution: usize) -> bool {
    HEIGHTMAP_RESOLUTIONS.contains(&resolution)
}

/// Erosion intensity preset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErosionPreset {
    /// Few particles, soft carving
    Gentle,
    /// Balanced erosion
    #[default]
    Normal,
    /// Many long-lived particles, deep channels
    Aggressive,
}

impl ErosionPreset {
    pub fn all() -> &'static [Self] {
        &[Self::Gentle, Self::Normal, Self::Aggressive]
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Gentle => "Light smoothing of fresh terrain",
            Self::Normal => "Balanced erosion",
            Self::Aggressive => "Deep valleys and long drainage lines",
        }
    }
}

impl std::fmt::Display for ErosionPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gentle => write!(f, "gentle"),
            Self::Normal => write!(f, "normal"),
            Self::Aggressive => write!(f, "aggressive"),
        }
    }
}

impl std::str::FromStr for ErosionPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|p| p.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::invalid("preset", format!("unknown preset '{}'", s)))
    }
}

/// Particle erosion parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErosionConfig {
    // =========================================================================
    // Particle seeding
    // =========================================================================

    /// Particles dropped on a chunk the first time it is eroded
    pub num_erosion_iterations: usize,

    /// Radius of the erosion brush in cells
    pub erosion_brush_radius: usize,

    /// Extra padding around a chunk in which particles keep simulating
    /// before they are handed to the neighbor
    pub halo_zone_width: usize,

    // =========================================================================
    // Particle physics
    // =========================================================================

    /// Maximum steps a particle takes over its whole life, across chunks
    pub max_lifetime: i32,

    /// Momentum conservation factor (0.0-1.0)
    pub inertia: f32,

    pub gravity: f32,

    pub start_speed: f32,

    pub start_water: f32,

    /// Fraction of water lost per step (0.0-1.0)
    pub evaporate_speed: f32,

    /// Sediment carrying capacity multiplier
    pub sediment_capacity_factor: f32,

    /// Floor for carrying capacity, keeps particles eroding on flat ground
    pub min_sediment_capacity: f32,

    pub deposit_speed: f32,

    pub erode_speed: f32,

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Log particle counts for every eroded chunk
    pub enable_debug_particle_count: bool,
}

impl Default for ErosionConfig {
    fn default() -> Self {
        Self {
            num_erosion_iterations: 50_000,
            erosion_brush_radius: 3,
            halo_zone_width: 8,

            max_lifetime: 30,
            inertia: 0.3,
            gravity: 4.0,
            start_speed: 1.0,
            start_water: 1.0,
            evaporate_speed: 0.01,
            sediment_capacity_factor: 3.0,
            min_sediment_capacity: 0.01,
            deposit_speed: 0.3,
            erode_speed: 0.3,

            enable_debug_particle_count: false,
        }
    }
}

impl ErosionConfig {
    /// Create a fast configuration for testing (fewer iterations)
    pub fn fast() -> Self {
        Self {
            num_erosion_iterations: 2_000,
            ..Default::default()
        }
    }

    pub fn from_preset(preset: ErosionPreset) -> Self {
        match preset {
            ErosionPreset::Gentle => Self {
                num_erosion_iterations: 20_000,
                erode_speed: 0.15,
                deposit_speed: 0.4,
                ..Default::default()
            },
            ErosionPreset::Normal => Self::default(),
            ErosionPreset::Aggressive => Self {
                num_erosion_iterations: 120_000,
                max_lifetime: 60,
                sediment_capacity_factor: 6.0,
                erode_speed: 0.5,
                evaporate_speed: 0.005,
                ..Default::default()
            },
        }
    }

    /// Width of the halo padding around a chunk. Always wide enough for the
    /// brush to stay inside the halo.
    pub fn border_size(&self) -> usize {
        self.erosion_brush_radius.max(self.halo_zone_width)
    }

    /// Exclusive upper bound for a particle's halo resilience.
    pub fn resilience_range(&self) -> i32 {
        (self.halo_zone_width as i32 - self.erosion_brush_radius as i32).max(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.erosion_brush_radius == 0 {
            return Err(ConfigError::invalid("erosion_brush_radius", "must be at least 1"));
        }
        if self.max_lifetime <= 0 {
            return Err(ConfigError::invalid("max_lifetime", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.inertia) {
            return Err(ConfigError::invalid("inertia", "must be within 0.0-1.0"));
        }
        if !(0.0..=1.0).contains(&self.evaporate_speed) {
            return Err(ConfigError::invalid("evaporate_speed", "must be within 0.0-1.0"));
        }
        if self.start_water <= 0.0 {
            return Err(ConfigError::invalid("start_water", "must be positive"));
        }
        Ok(())
    }
}

/// Parameters for the FBM terrain generator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Noise-space offset added to every sample
    pub offset: [f64; 2],
    /// Global frequency multiplier
    pub scale: f64,
    pub x_scale: f64,
    pub y_scale: f64,
    /// Height of a full-amplitude noise peak
    pub height_scale: f32,
    /// Amplitude decay per octave (0.0-1.0)
    pub persistence: f64,
    /// Frequency multiplier per octave
    pub lacunarity: f64,
    pub octaves: u32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0],
            scale: 1.0,
            x_scale: 0.01,
            y_scale: 0.01,
            height_scale: 3.0,
            persistence: 0.5,
            lacunarity: 2.0,
            octaves: 8,
        }
    }
}

/// Top-level settings for a streamed world
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Chunks loaded in every direction around the view
    pub view_distance_in_chunks: u32,
    /// Cells per chunk side, one of `HEIGHTMAP_RESOLUTIONS`
    pub chunk_resolution: usize,
    pub chunk_size_in_world_units: f32,
    pub world_seed: i32,
    /// Dirty chunks eroded per `tick`
    pub max_chunks_to_process_per_frame: usize,
    /// Inbox capacity per chunk; older particles are dropped beyond this
    pub max_incoming_particles: usize,
    /// Prefer the wgpu kernel when an adapter is available
    pub use_gpu: bool,
    pub erosion: ErosionConfig,
    pub terrain: TerrainConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            view_distance_in_chunks: 3,
            chunk_resolution: 129,
            chunk_size_in_world_units: 128.0,
            world_seed: 0,
            max_chunks_to_process_per_frame: 5,
            max_incoming_particles: 300_000,
            use_gpu: false,
            erosion: ErosionConfig::default(),
            terrain: TerrainConfig::default(),
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_resolution(self.chunk_resolution) {
            return Err(ConfigError::invalid(
                "chunk_resolution",
                format!("{} is not one of {:?}", self.chunk_resolution, HEIGHTMAP_RESOLUTIONS),
            ));
        }
        if self.view_distance_in_chunks == 0 {
            return Err(ConfigError::invalid("view_distance_in_chunks", "must be at least 1"));
        }
        if self.max_chunks_to_process_per_frame == 0 {
            return Err(ConfigError::invalid("max_chunks_to_process_per_frame", "must be at least 1"));
        }
        if self.max_incoming_particles == 0 {
            return Err(ConfigError::invalid("max_incoming_particles", "must be at least 1"));
        }
        if self.chunk_size_in_world_units <= 0.0 || !self.chunk_size_in_world_units.is_finite() {
            return Err(ConfigError::invalid("chunk_size_in_world_units", "must be positive"));
        }
        if self.erosion.border_size() >= self.chunk_resolution {
            return Err(ConfigError::invalid(
                "halo_zone_width",
                format!("border {} must be smaller than the chunk resolution", self.erosion.border_size()),
            ));
        }
        if self.terrain.octaves == 0 {
            return Err(ConfigError::invalid("terrain.octaves", "must be at least 1"));
        }
        self.erosion.validate()
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: WorldConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(WorldConfig::default().validate().is_ok());
        for preset in ErosionPreset::all() {
            assert!(ErosionConfig::from_preset(*preset).validate().is_ok(), "{}", preset);
        }
    }

    #[test]
    fn test_border_size_takes_larger_bound() {
        let mut cfg = ErosionConfig::default();
        assert_eq!(cfg.border_size(), 8);
        cfg.erosion_brush_radius = 12;
        assert_eq!(cfg.border_size(), 12);
        assert_eq!(cfg.resilience_range(), 1);
    }

    #[test]
    fn test_rejects_bad_resolution() {
        let cfg = WorldConfig {
            chunk_resolution: 100,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: WorldConfig =
            serde_json::from_str(r#"{ "world_seed": 7, "erosion": { "max_lifetime": 12 } }"#).unwrap();
        assert_eq!(cfg.world_seed, 7);
        assert_eq!(cfg.erosion.max_lifetime, 12);
        assert_eq!(cfg.erosion.num_erosion_iterations, 50_000);
        assert_eq!(cfg.chunk_resolution, 129);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        let cfg = WorldConfig {
            world_seed: -3,
            chunk_resolution: 65,
            erosion: ErosionConfig::from_preset(ErosionPreset::Gentle),
            ..Default::default()
        };
        cfg.save(&path).unwrap();
        assert_eq!(WorldConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(WorldConfig::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_preset_parse() {
        assert_eq!("Aggressive".parse::<ErosionPreset>().unwrap(), ErosionPreset::Aggressive);
        assert!("extreme".parse::<ErosionPreset>().is_err());
    }
}
