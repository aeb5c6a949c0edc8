//! Streaming world scheduler.
//!
//! Keeps a square window of chunks loaded around the view position, erodes
//! dirty chunks a few per tick, and routes particles between chunks and the
//! unloaded-chunk cache.
//!
//! Per-chunk pipeline (one dirty chunk at a time, in queue order):
//! 1. Make sure every neighbor coordinate has a height field (active or cached)
//! 2. Generate the bordered seed field and build the halo map
//! 3. Run the particle eroder over the halo
//! 4. Write the halo back into the chunk and its neighbors
//! 5. Route exited particles and re-queue neighbors whose borders changed

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use log::{debug, error, info, warn};

use crate::cache::{CacheEntry, UnloadedChunkCache};
use crate::chunk::Chunk;
use crate::config::{ErosionConfig, WorldConfig};
use crate::erosion::{select_kernel, ErosionKernel, ErosionStats, ParticleEroder};
use crate::error::{ConfigError, GeneratorError, Result, WorldError};
use crate::generator::{FbmGenerator, TerrainGenerator};
use crate::grid::{window, world_to_grid, GridCoord};
use crate::halo::{HaloMap, NeighborFields, Residency};
use crate::particle::Particle;
use crate::tilemap::HeightField;
use crate::transfer::{process_transfers, ParticleSink};

/// Receives notifications when chunk terrain changes, e.g. a renderer.
pub trait ChunkObserver {
    fn chunk_updated(&mut self, chunk: &Chunk);

    fn chunk_unloaded(&mut self, _coords: GridCoord) {}
}

/// FIFO of dirty coordinates; each coordinate is queued at most once.
#[derive(Clone, Debug, Default)]
pub struct DirtyQueue {
    queue: VecDeque<GridCoord>,
    members: HashSet<GridCoord>,
}

impl DirtyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `coords`. Returns false if it was already queued.
    pub fn push(&mut self, coords: GridCoord) -> bool {
        if !self.members.insert(coords) {
            return false;
        }
        self.queue.push_back(coords);
        true
    }

    pub fn pop(&mut self) -> Option<GridCoord> {
        let coords = self.queue.pop_front()?;
        self.members.remove(&coords);
        Some(coords)
    }

    pub fn remove(&mut self, coords: GridCoord) -> bool {
        if !self.members.remove(&coords) {
            return false;
        }
        self.queue.retain(|c| *c != coords);
        true
    }

    pub fn contains(&self, coords: GridCoord) -> bool {
        self.members.contains(&coords)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.members.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &GridCoord> {
        self.queue.iter()
    }
}

/// Active chunks plus the cache; the one place height fields live.
#[derive(Default)]
struct ChunkStore {
    active: HashMap<GridCoord, Chunk>,
    cache: UnloadedChunkCache,
}

impl NeighborFields for ChunkStore {
    fn field(&self, coords: GridCoord) -> Option<&HeightField> {
        if let Some(chunk) = self.active.get(&coords) {
            return Some(&chunk.height_field);
        }
        self.cache.get(coords).and_then(|entry| entry.height_field.as_ref())
    }

    fn field_mut(&mut self, coords: GridCoord) -> Option<(&mut HeightField, Residency)> {
        if self.active.contains_key(&coords) {
            return self
                .active
                .get_mut(&coords)
                .map(|chunk| (&mut chunk.height_field, Residency::Active));
        }
        self.cache
            .get_mut(coords)
            .and_then(|entry| entry.height_field.as_mut())
            .map(|field| (field, Residency::Cached))
    }
}

/// What the last `tick` did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Chunks eroded, in processing order
    pub processed: Vec<GridCoord>,
    /// Chunks whose halo could not be built; they are left clean
    pub skipped: Vec<GridCoord>,
    /// Chunks whose pass failed and were left dirty
    pub failed: Vec<GridCoord>,
    /// Queue length after the tick
    pub queued: usize,
}

/// How a single chunk's erosion pass ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChunkPass {
    Eroded,
    Skipped,
}

/// Snapshot of world state and running totals.
#[derive(Clone, Debug, Default)]
pub struct WorldStats {
    pub active_chunks: usize,
    pub cached_chunks: usize,
    pub queued_chunks: usize,
    pub failed_loads: usize,
    pub inbox_particles: usize,
    pub pending_particles: usize,
    pub chunks_eroded: usize,
    pub particles_simulated: usize,
    pub particles_transferred: usize,
    pub particles_dropped: usize,
    pub erosion: ErosionStats,
}

impl WorldStats {
    pub fn summary(&self) -> String {
        format!(
            "Active: {} | Cached: {} | Queued: {} | Eroded: {} | Simulated: {} | Transferred: {} | Dropped: {} | Waiting: {} inbox, {} pending",
            self.active_chunks,
            self.cached_chunks,
            self.queued_chunks,
            self.chunks_eroded,
            self.particles_simulated,
            self.particles_transferred,
            self.particles_dropped,
            self.inbox_particles,
            self.pending_particles
        )
    }
}

#[derive(Clone, Debug, Default)]
struct Counters {
    chunks_eroded: usize,
    particles_simulated: usize,
    particles_transferred: usize,
    particles_dropped: usize,
    erosion: ErosionStats,
}

/// The streaming world.
pub struct World {
    config: WorldConfig,
    store: ChunkStore,
    generator: Box<dyn TerrainGenerator>,
    eroder: ParticleEroder,
    observer: Option<Box<dyn ChunkObserver>>,
    dirty: DirtyQueue,
    view_center: Option<GridCoord>,
    failed_loads: BTreeSet<GridCoord>,
    counters: Counters,
    last_tick: TickReport,
}

impl World {
    pub fn new(
        config: WorldConfig,
        generator: Box<dyn TerrainGenerator>,
        kernel: Box<dyn ErosionKernel>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store: ChunkStore::default(),
            generator,
            eroder: ParticleEroder::new(kernel),
            observer: None,
            dirty: DirtyQueue::new(),
            view_center: None,
            failed_loads: BTreeSet::new(),
            counters: Counters::default(),
            last_tick: TickReport::default(),
        })
    }

    /// FBM terrain and the kernel selected by `config.use_gpu`.
    pub fn with_defaults(config: WorldConfig) -> Result<Self> {
        let generator = FbmGenerator::new(config.terrain.clone());
        let kernel = select_kernel(config.use_gpu);
        Self::new(config, Box::new(generator), kernel)
    }

    pub fn set_observer(&mut self, observer: Box<dyn ChunkObserver>) {
        self.observer = Some(observer);
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn kernel_name(&self) -> &'static str {
        self.eroder.kernel_name()
    }

    pub fn get_chunk(&self, coords: GridCoord) -> Option<&Chunk> {
        self.store.active.get(&coords)
    }

    /// Active coordinates in sorted order.
    pub fn active_coords(&self) -> Vec<GridCoord> {
        let mut coords: Vec<GridCoord> = self.store.active.keys().copied().collect();
        coords.sort();
        coords
    }

    pub fn cache(&self) -> &UnloadedChunkCache {
        &self.store.cache
    }

    pub fn view_center(&self) -> Option<GridCoord> {
        self.view_center
    }

    pub fn queue_len(&self) -> usize {
        self.dirty.len()
    }

    /// Queued coordinates, front first.
    pub fn queued(&self) -> Vec<GridCoord> {
        self.dirty.iter().copied().collect()
    }

    pub fn failed_loads(&self) -> Vec<GridCoord> {
        self.failed_loads.iter().copied().collect()
    }

    pub fn last_tick(&self) -> &TickReport {
        &self.last_tick
    }

    pub fn stats(&self) -> WorldStats {
        WorldStats {
            active_chunks: self.store.active.len(),
            cached_chunks: self.store.cache.len(),
            queued_chunks: self.dirty.len(),
            failed_loads: self.failed_loads.len(),
            inbox_particles: self.store.active.values().map(|c| c.inbox.len()).sum(),
            pending_particles: self.store.cache.pending_particle_count(),
            chunks_eroded: self.counters.chunks_eroded,
            particles_simulated: self.counters.particles_simulated,
            particles_transferred: self.counters.particles_transferred,
            particles_dropped: self.counters.particles_dropped,
            erosion: self.counters.erosion.clone(),
        }
    }

    /// Move the view. Chunks outside the new window are unloaded, missing
    /// ones loaded. Does nothing if the view stays in the same chunk.
    pub fn update_view_position(&mut self, world_pos: [f32; 3]) {
        let Some(center) = world_to_grid(world_pos, self.config.chunk_size_in_world_units) else {
            warn!("Ignoring view position {:?}: outside the chunk grid", world_pos);
            return;
        };
        if self.view_center == Some(center) {
            return;
        }
        self.view_center = Some(center);

        let required = window(center, self.config.view_distance_in_chunks);
        let required_set: HashSet<GridCoord> = required.iter().copied().collect();

        let mut to_unload: Vec<GridCoord> = self
            .store
            .active
            .keys()
            .filter(|c| !required_set.contains(c))
            .copied()
            .collect();
        to_unload.sort();
        for coords in to_unload {
            self.unload_chunk(coords);
        }
        self.failed_loads.retain(|c| required_set.contains(c));

        for coords in required {
            if self.store.active.contains_key(&coords) {
                continue;
            }
            if let Err(e) = self.load_chunk(coords) {
                error!("Failed to load chunk {}: {}", coords, e);
                self.failed_loads.insert(coords);
            }
        }

        debug!(
            "View centered on {}: {} active, {} cached, {} queued",
            center,
            self.store.active.len(),
            self.store.cache.len(),
            self.dirty.len()
        );
    }

    /// Erode up to `max_chunks_to_process_per_frame` dirty chunks.
    ///
    /// Chunks are taken from the front of the queue before any is processed;
    /// a chunk dirtied during this tick waits for the next one.
    pub fn tick(&mut self) {
        self.retry_failed_loads();

        let mut batch = Vec::with_capacity(self.config.max_chunks_to_process_per_frame);
        while batch.len() < self.config.max_chunks_to_process_per_frame {
            let Some(coords) = self.dirty.pop() else {
                break;
            };
            if self.store.active.contains_key(&coords) {
                batch.push(coords);
            }
        }

        let mut report = TickReport::default();
        for coords in batch {
            match self.erode_chunk(coords) {
                Ok(ChunkPass::Eroded) => report.processed.push(coords),
                Ok(ChunkPass::Skipped) => report.skipped.push(coords),
                Err(e) => {
                    error!("Erosion of chunk {} failed: {}", coords, e);
                    report.failed.push(coords);
                }
            }
        }

        self.check_invariants();
        report.queued = self.dirty.len();
        debug!(
            "Tick: {} processed, {} skipped, {} failed, {} queued",
            report.processed.len(),
            report.skipped.len(),
            report.failed.len(),
            report.queued
        );
        self.last_tick = report;
    }

    /// Forget all erosion: drop the cache, regenerate every active chunk and
    /// queue all of them.
    pub fn force_full_regeneration(&mut self) {
        let dropped = self.store.cache.clear();
        self.dirty.clear();
        info!(
            "Full regeneration of {} chunks (seed {}, {} pending particles discarded)",
            self.store.active.len(),
            self.config.world_seed,
            dropped
        );

        let resolution = self.config.chunk_resolution;
        let seed = self.config.world_seed;
        for coords in self.active_coords() {
            let generated = generate_field(self.generator.as_mut(), coords, resolution, seed);
            let Some(chunk) = self.store.active.get_mut(&coords) else {
                continue;
            };
            match generated {
                Ok(field) => chunk.height_field = field,
                Err(e) => error!("Regenerating chunk {} failed, keeping old terrain: {}", coords, e),
            }
            chunk.initial_particles_dropped = false;
            chunk.inbox.clear();
            chunk.is_dirty = true;
            self.dirty.push(coords);
            if let Some(observer) = self.observer.as_mut() {
                observer.chunk_updated(chunk);
            }
        }
    }

    /// Change the world seed and regenerate.
    pub fn set_world_seed(&mut self, seed: i32) {
        self.config.world_seed = seed;
        self.force_full_regeneration();
    }

    /// Replace the erosion parameters and regenerate.
    pub fn set_erosion_config(&mut self, erosion: ErosionConfig) -> std::result::Result<(), ConfigError> {
        let mut config = self.config.clone();
        config.erosion = erosion;
        config.validate()?;
        self.config = config;
        self.force_full_regeneration();
        Ok(())
    }

    /// Load `coords`, from the cache if it has an entry, from the generator otherwise.
    pub fn load_chunk(&mut self, coords: GridCoord) -> Result<()> {
        if self.store.active.contains_key(&coords) {
            return Ok(());
        }

        let resolution = self.config.chunk_resolution;
        let cached = self.store.cache.take(coords);
        let had_entry = cached.is_some();
        let mut entry = cached.unwrap_or_else(|| CacheEntry::new(coords));

        let from_cache = entry.height_field.is_some();
        let field = match entry.height_field.take() {
            Some(field) => field,
            None => match generate_field(self.generator.as_mut(), coords, resolution, self.config.world_seed) {
                Ok(field) => field,
                Err(e) => {
                    if had_entry {
                        self.store.cache.insert(entry);
                    }
                    return Err(e.into());
                }
            },
        };

        let mut chunk = Chunk::new(coords, field, self.config.max_incoming_particles);
        chunk.initial_particles_dropped = entry.initial_particles_dropped;
        let pending = entry.pending_particles.len();
        let dropped = chunk.inbox.extend(entry.pending_particles);
        if dropped > 0 {
            warn!("Inbox of {} full on load: dropped {} oldest particles", coords, dropped);
            self.counters.particles_dropped += dropped;
        }

        for (dir, neighbor) in coords.neighbors() {
            if let Some(other) = self.store.active.get_mut(&neighbor) {
                other.link(dir.opposite());
                chunk.link(dir);
            }
        }

        chunk.is_dirty = true;
        self.store.active.insert(coords, chunk);
        self.dirty.push(coords);
        self.notify_updated(coords);

        debug!(
            "Loaded chunk {} ({}, {} pending particles)",
            coords,
            if from_cache { "from cache" } else { "generated" },
            pending
        );
        Ok(())
    }

    /// Move an active chunk into the cache. Returns false if it was not active.
    pub fn unload_chunk(&mut self, coords: GridCoord) -> bool {
        let Some(mut chunk) = self.store.active.remove(&coords) else {
            return false;
        };

        let links: Vec<_> = chunk.linked_neighbors().collect();
        for (dir, neighbor) in links {
            if let Some(other) = self.store.active.get_mut(&neighbor) {
                other.unlink(dir.opposite());
            }
        }

        self.dirty.remove(coords);
        let inbox = chunk.inbox.drain();
        debug!("Unloaded chunk {} ({} inbox particles kept)", coords, inbox.len());
        self.store
            .cache
            .store_unloaded(coords, chunk.height_field, chunk.initial_particles_dropped, inbox);

        if let Some(observer) = self.observer.as_mut() {
            observer.chunk_unloaded(coords);
        }
        true
    }

    fn retry_failed_loads(&mut self) {
        let pending: Vec<GridCoord> = self.failed_loads.iter().copied().collect();
        for coords in pending {
            match self.load_chunk(coords) {
                Ok(()) => {
                    self.failed_loads.remove(&coords);
                }
                Err(e) => debug!("Chunk {} still failing to load: {}", coords, e),
            }
        }
    }

    fn mark_dirty(&mut self, coords: GridCoord) {
        if let Some(chunk) = self.store.active.get_mut(&coords) {
            chunk.is_dirty = true;
            self.dirty.push(coords);
        }
    }

    fn notify_updated(&mut self, coords: GridCoord) {
        if let (Some(observer), Some(chunk)) = (self.observer.as_mut(), self.store.active.get(&coords)) {
            observer.chunk_updated(chunk);
        }
    }

    /// Give an inactive coordinate a cache entry with a height field.
    /// If generation fails the entry still exists, without a field.
    fn ensure_cached(&mut self, coords: GridCoord) {
        if self.store.active.contains_key(&coords) {
            return;
        }
        let needs_field = self
            .store
            .cache
            .get(coords)
            .map_or(true, |entry| entry.height_field.is_none());

        let field = if needs_field {
            match generate_field(
                self.generator.as_mut(),
                coords,
                self.config.chunk_resolution,
                self.config.world_seed,
            ) {
                Ok(field) => Some(field),
                Err(e) => {
                    error!("Could not generate cached terrain for {}: {}", coords, e);
                    None
                }
            }
        } else {
            None
        };

        let entry = self.store.cache.get_or_create(coords);
        if field.is_some() {
            entry.height_field = field;
        }
    }

    fn requeue(&mut self, coords: GridCoord) {
        self.mark_dirty(coords);
    }

    fn erode_chunk(&mut self, coords: GridCoord) -> Result<ChunkPass> {
        self.dirty.remove(coords);
        let Some(chunk) = self.store.active.get(&coords) else {
            return Err(WorldError::NotActive { coords });
        };
        let resolution = chunk.resolution();
        let border = self.config.erosion.border_size();
        let world_seed = self.config.world_seed;

        for (_, neighbor) in coords.neighbors() {
            self.ensure_cached(neighbor);
        }

        let seed_field = match self.generator.generate(coords, resolution, border, world_seed) {
            Ok(field) => field,
            Err(e) => {
                self.requeue(coords);
                return Err(e.into());
            }
        };

        let mut halo = match HaloMap::build(coords, border, seed_field, &self.store) {
            Ok(halo) => halo,
            Err(e) => {
                warn!("Skipping chunk {}: {}", coords, e);
                if let Some(chunk) = self.store.active.get_mut(&coords) {
                    chunk.is_dirty = false;
                }
                return Ok(ChunkPass::Skipped);
            }
        };

        let chunk = self
            .store
            .active
            .get_mut(&coords)
            .ok_or(WorldError::NotActive { coords })?;
        let outcome = match self.eroder.erode(chunk, &mut halo, world_seed, &self.config.erosion) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.requeue(coords);
                return Err(e.into());
            }
        };

        let written = halo.deconstruct(&mut self.store);
        if let Ok(dirtied) = &written {
            for &neighbor in dirtied {
                self.mark_dirty(neighbor);
            }
        }

        // Particles already left the inbox; route them even if the write-back failed
        let exited = outcome.outgoing.len();
        let report = process_transfers(coords, resolution, outcome.outgoing, self);
        self.counters.particles_transferred += report.to_active + report.to_cache;
        if let Err(e) = written {
            self.requeue(coords);
            return Err(e.into());
        }

        if self.config.erosion.enable_debug_particle_count {
            info!(
                "Chunk {}: {} particles simulated, {} left ({} to active, {} to cache)",
                coords, outcome.simulated, exited, report.to_active, report.to_cache
            );
        }

        self.counters.chunks_eroded += 1;
        self.counters.particles_simulated += outcome.simulated;
        self.counters.erosion.merge(&outcome.stats);

        let still_dirty = self.dirty.contains(coords);
        if let Some(chunk) = self.store.active.get_mut(&coords) {
            chunk.is_dirty = still_dirty;
        }
        self.notify_updated(coords);
        Ok(ChunkPass::Eroded)
    }

    /// A coordinate must never be both active and cached. The active chunk wins.
    fn check_invariants(&mut self) {
        let overlap: Vec<GridCoord> = self
            .store
            .active
            .keys()
            .filter(|c| self.store.cache.contains(**c))
            .copied()
            .collect();
        debug_assert!(overlap.is_empty(), "coordinates both active and cached: {:?}", overlap);

        for coords in overlap {
            if let Some(entry) = self.store.cache.remove(coords) {
                error!(
                    "Chunk {} was both active and cached; discarded cache entry with {} pending particles",
                    coords,
                    entry.pending_particles.len()
                );
                self.counters.particles_dropped += entry.pending_particles.len();
            }
        }
    }
}

/// Unbordered field for a chunk, checked against the expected size.
fn generate_field(
    generator: &mut dyn TerrainGenerator,
    coords: GridCoord,
    resolution: usize,
    world_seed: i32,
) -> std::result::Result<HeightField, GeneratorError> {
    let field = generator.generate(coords, resolution, 0, world_seed)?;
    if field.width != resolution || field.height != resolution {
        return Err(GeneratorError::Failed {
            coords,
            message: format!("expected {0}x{0} field, got {1}x{2}", resolution, field.width, field.height),
        });
    }
    Ok(field)
}

impl ParticleSink for World {
    fn is_active(&self, coords: GridCoord) -> bool {
        self.store.active.contains_key(&coords)
    }

    fn deliver_to_chunk(&mut self, coords: GridCoord, particles: Vec<Particle>) {
        let Some(chunk) = self.store.active.get_mut(&coords) else {
            self.deliver_to_cache(coords, particles);
            return;
        };
        let dropped = chunk.inbox.extend(particles);
        if dropped > 0 {
            warn!("Inbox of {} full: dropped {} oldest particles", coords, dropped);
            self.counters.particles_dropped += dropped;
        }
        self.mark_dirty(coords);
    }

    fn deliver_to_cache(&mut self, coords: GridCoord, particles: Vec<Particle>) {
        if self.store.active.contains_key(&coords) {
            self.deliver_to_chunk(coords, particles);
            return;
        }
        self.ensure_cached(coords);
        self.store.cache.get_or_create(coords).pending_particles.extend(particles);
    }
}
