use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use chunked_erosion::config::{ErosionConfig, ErosionPreset, WorldConfig};
use chunked_erosion::export::export_active_window;
use chunked_erosion::world::World;

#[derive(Parser, Debug)]
#[command(name = "chunked_erosion")]
#[command(about = "Stream an infinite eroded terrain around a moving view")]
struct Args {
    /// World seed (overrides the config file)
    #[arg(short, long)]
    seed: Option<i32>,

    /// Chunks loaded in every direction around the view
    #[arg(short = 'd', long)]
    view_distance: Option<u32>,

    /// Cells per chunk side (2^n + 1, 33-4097)
    #[arg(short, long)]
    resolution: Option<usize>,

    /// Chunk side length in world units
    #[arg(long)]
    chunk_size: Option<f32>,

    /// Erosion particles seeded per chunk
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Number of simulation steps
    #[arg(short, long, default_value = "60")]
    ticks: usize,

    /// View speed along +x in world units per tick
    #[arg(long, default_value = "16.0")]
    speed: f32,

    /// Dirty chunks eroded per tick
    #[arg(long)]
    max_per_tick: Option<usize>,

    /// JSON config file; command-line options override its values
    #[arg(short, long)]
    config: Option<String>,

    /// Erosion preset: gentle, normal or aggressive
    #[arg(short, long)]
    preset: Option<ErosionPreset>,

    /// Use the GPU erosion kernel if an adapter is available
    #[arg(long)]
    gpu: bool,

    /// Export the final active window to a PNG
    #[arg(short, long)]
    export: Option<String>,
}

fn build_config(args: &Args) -> Result<WorldConfig, chunked_erosion::error::ConfigError> {
    let mut config = match &args.config {
        Some(path) => WorldConfig::load(path)?,
        None => WorldConfig::default(),
    };

    if let Some(preset) = args.preset {
        config.erosion = ErosionConfig {
            erosion_brush_radius: config.erosion.erosion_brush_radius,
            halo_zone_width: config.erosion.halo_zone_width,
            enable_debug_particle_count: config.erosion.enable_debug_particle_count,
            ..ErosionConfig::from_preset(preset)
        };
    }
    if let Some(seed) = args.seed {
        config.world_seed = seed;
    }
    if let Some(distance) = args.view_distance {
        config.view_distance_in_chunks = distance;
    }
    if let Some(resolution) = args.resolution {
        config.chunk_resolution = resolution;
    }
    if let Some(size) = args.chunk_size {
        config.chunk_size_in_world_units = size;
    }
    if let Some(iterations) = args.iterations {
        config.erosion.num_erosion_iterations = iterations;
    }
    if let Some(max) = args.max_per_tick {
        config.max_chunks_to_process_per_frame = max;
    }
    if args.gpu {
        config.use_gpu = true;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Chunked Erosion");
    println!("===============");
    println!("Seed: {}", config.world_seed);
    println!(
        "Chunks: {}x{} cells, {} world units, view distance {}",
        config.chunk_resolution,
        config.chunk_resolution,
        config.chunk_size_in_world_units,
        config.view_distance_in_chunks
    );
    println!(
        "Erosion: {} particles per chunk, border {}",
        config.erosion.num_erosion_iterations,
        config.erosion.border_size()
    );

    let mut world = match World::with_defaults(config) {
        Ok(world) => world,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Erosion kernel: {}", world.kernel_name());

    let mut position = [0.0f32, 0.0, 0.0];
    for step in 0..args.ticks {
        world.update_view_position(position);
        world.tick();

        let report = world.last_tick();
        if !report.processed.is_empty() || !report.failed.is_empty() {
            println!(
                "Tick {:>4}: view {:?} | eroded {} | failed {} | queued {}",
                step,
                world.view_center(),
                report.processed.len(),
                report.failed.len(),
                report.queued
            );
        }
        position[0] += args.speed;
    }

    println!();
    println!("{}", world.stats().summary());
    println!("Cache: {}", world.cache().stats().summary());

    if let Some(path) = &args.export {
        match export_active_window(&world, path) {
            Ok(true) => println!("Exported active window to {}", path),
            Ok(false) => println!("Nothing loaded, skipped export"),
            Err(e) => {
                error!("Export to {} failed: {}", path, e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
