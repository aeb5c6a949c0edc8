//! Error types for world streaming and erosion.

use crate::grid::GridCoord;

/// Invalid or unreadable configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {field} ({reason})")]
    Invalid { field: String, reason: String },

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Terrain generation errors
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("Invalid resolution {resolution} for chunk {coords}")]
    InvalidResolution { coords: GridCoord, resolution: usize },

    #[error("Generator produced non-finite heights for chunk {coords}")]
    NonFinite { coords: GridCoord },

    #[error("Generator failed for chunk {coords}: {message}")]
    Failed { coords: GridCoord, message: String },
}

/// Erosion kernel errors
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("GPU not available: {message}")]
    GpuUnavailable { message: String },

    #[error("GPU buffer readback failed: {message}")]
    Readback { message: String },

    #[error("Invalid halo geometry: {width}x{height} with border {border}")]
    InvalidHalo { width: usize, height: usize, border: usize },
}

/// Halo assembly errors
#[derive(Debug, thiserror::Error)]
pub enum HaloError {
    #[error("No height field for center chunk {coords}")]
    MissingCenter { coords: GridCoord },

    #[error("Height field of {coords} is {actual}x{actual}, expected {expected}x{expected}")]
    SizeMismatch { coords: GridCoord, expected: usize, actual: usize },

    #[error("Seed field is {actual} wide, expected {expected}")]
    SeedMismatch { expected: usize, actual: usize },
}

/// Top-level error for world operations
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Halo(#[from] HaloError),

    #[error("Chunk {coords} is not active")]
    NotActive { coords: GridCoord },
}

pub type Result<T, E = WorldError> = std::result::Result<T, E>;
