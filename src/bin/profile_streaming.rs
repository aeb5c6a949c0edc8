//! Profiling tool for chunk streaming and erosion ticks

use std::time::{Duration, Instant};

use chunked_erosion::config::WorldConfig;
use chunked_erosion::world::World;

fn percent(part: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        0.0
    } else {
        100.0 * part.as_secs_f64() / total.as_secs_f64()
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut config = WorldConfig {
        view_distance_in_chunks: 2,
        chunk_resolution: 129,
        max_chunks_to_process_per_frame: 5,
        world_seed: 1337,
        ..Default::default()
    };
    config.erosion.num_erosion_iterations = 20_000;
    let steps = 40;
    let speed = config.chunk_size_in_world_units * 0.25;

    println!("=== Streaming Profile ===");
    println!(
        "Window: {}x{} chunks of {} cells",
        2 * config.view_distance_in_chunks + 1,
        2 * config.view_distance_in_chunks + 1,
        config.chunk_resolution
    );
    println!("Particles per chunk: {}", config.erosion.num_erosion_iterations);
    println!();

    let mut world = match World::with_defaults(config) {
        Ok(world) => world,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return;
        }
    };

    // Initial window
    let start = Instant::now();
    world.update_view_position([0.0, 0.0, 0.0]);
    let initial_load = start.elapsed();
    println!("Initial load: {:?} ({} chunks)", initial_load, world.active_coords().len());

    let mut load_time = Duration::ZERO;
    let mut tick_time = Duration::ZERO;
    let mut slowest_tick = Duration::ZERO;
    let mut position = [0.0f32, 0.0, 0.0];

    for _ in 0..steps {
        position[0] += speed;

        let start = Instant::now();
        world.update_view_position(position);
        load_time += start.elapsed();

        let start = Instant::now();
        world.tick();
        let elapsed = start.elapsed();
        tick_time += elapsed;
        slowest_tick = slowest_tick.max(elapsed);
    }

    let stats = world.stats();
    let total = initial_load + load_time + tick_time;
    println!("\n=== Summary ({} steps, {} kernel) ===", steps, world.kernel_name());
    println!("Initial load:  {:>8.2}% ({:?})", percent(initial_load, total), initial_load);
    println!("Streaming:     {:>8.2}% ({:?})", percent(load_time, total), load_time);
    println!("Erosion ticks: {:>8.2}% ({:?})", percent(tick_time, total), tick_time);
    println!("─────────────────────────────────");
    println!("Total: {:?}", total);
    println!("Slowest tick: {:?}", slowest_tick);
    if stats.chunks_eroded > 0 {
        println!("Per chunk: {:?}", tick_time / stats.chunks_eroded as u32);
    }
    println!();
    println!("{}", stats.summary());
    println!("Cache: {}", world.cache().stats().summary());
}
