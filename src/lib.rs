//! Infinite terrain streamed in chunks and shaped by particle erosion that
//! flows across chunk boundaries.

pub mod cache;
pub mod chunk;
pub mod config;
pub mod erosion;
pub mod error;
pub mod export;
pub mod generator;
pub mod grid;
pub mod halo;
pub mod particle;
pub mod seeds;
pub mod tilemap;
pub mod transfer;
pub mod world;
