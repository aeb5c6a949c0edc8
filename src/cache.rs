//! Cache of chunks that are not currently loaded.
//!
//! An entry is either a chunk that was unloaded (it keeps its eroded heights)
//! or a placeholder created so that particles and border writes aimed at an
//! inactive coordinate are not lost. Entries live for the whole process.

use std::collections::HashMap;

use crate::grid::GridCoord;
use crate::particle::Particle;
use crate::tilemap::HeightField;

/// Cache statistics for monitoring
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    /// Lookups on load that found an entry
    pub hits: usize,
    /// Lookups on load that found nothing
    pub misses: usize,
    /// Entries created for inactive coordinates
    pub created: usize,
    /// Entries dropped by `clear`
    pub cleared: usize,
    /// Current number of entries
    pub entries: usize,
    /// Particles waiting in entries
    pub pending_particles: usize,
    /// Estimated memory usage in bytes
    pub memory_bytes: usize,
}

impl CacheStats {
    /// Calculate hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f32 / total as f32
        }
    }

    /// Format as human-readable string
    pub fn summary(&self) -> String {
        format!(
            "Hits: {} | Misses: {} | Rate: {:.1}% | Entries: {} | Pending: {} | Mem: {:.1}MB",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.entries,
            self.pending_particles,
            self.memory_bytes as f32 / (1024.0 * 1024.0)
        )
    }
}

/// State kept for one inactive coordinate.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub coords: GridCoord,
    /// `None` until a generator has produced heights for this coordinate
    pub height_field: Option<HeightField>,
    /// Particles that arrived while the chunk was inactive, oldest first
    pub pending_particles: Vec<Particle>,
    pub initial_particles_dropped: bool,
}

impl CacheEntry {
    pub fn new(coords: GridCoord) -> Self {
        Self {
            coords,
            height_field: None,
            pending_particles: Vec::new(),
            initial_particles_dropped: false,
        }
    }

    pub fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.height_field.as_ref().map_or(0, |f| f.as_slice().len() * std::mem::size_of::<f32>())
            + self.pending_particles.len() * std::mem::size_of::<Particle>()
    }
}

/// Entries for inactive coordinates, keyed by grid coordinate.
#[derive(Debug, Default)]
pub struct UnloadedChunkCache {
    entries: HashMap<GridCoord, CacheEntry>,
    stats: CacheStats,
}

impl UnloadedChunkCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, coords: GridCoord) -> bool {
        self.entries.contains_key(&coords)
    }

    pub fn get(&self, coords: GridCoord) -> Option<&CacheEntry> {
        self.entries.get(&coords)
    }

    pub fn get_mut(&mut self, coords: GridCoord) -> Option<&mut CacheEntry> {
        self.entries.get_mut(&coords)
    }

    /// Entry for `coords`, created empty if absent.
    pub fn get_or_create(&mut self, coords: GridCoord) -> &mut CacheEntry {
        let stats = &mut self.stats;
        self.entries.entry(coords).or_insert_with(|| {
            stats.created += 1;
            CacheEntry::new(coords)
        })
    }

    /// Record an unloaded chunk. Particles already pending for the coordinate
    /// stay ahead of the chunk's own inbox.
    pub fn store_unloaded(
        &mut self,
        coords: GridCoord,
        height_field: HeightField,
        initial_particles_dropped: bool,
        inbox: Vec<Particle>,
    ) {
        let entry = self.get_or_create(coords);
        entry.height_field = Some(height_field);
        entry.initial_particles_dropped = initial_particles_dropped;
        entry.pending_particles.extend(inbox);
    }

    /// Remove and return the entry for a chunk being loaded.
    pub fn take(&mut self, coords: GridCoord) -> Option<CacheEntry> {
        let entry = self.entries.remove(&coords);
        if entry.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        entry
    }

    /// Put back an entry previously returned by `take`.
    pub fn insert(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.coords, entry);
    }

    pub fn remove(&mut self, coords: GridCoord) -> Option<CacheEntry> {
        self.entries.remove(&coords)
    }

    /// Drop every entry. Returns how many pending particles were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending_particle_count();
        self.stats.cleared += self.entries.len();
        self.entries.clear();
        dropped
    }

    pub fn pending_particle_count(&self) -> usize {
        self.entries.values().map(|e| e.pending_particles.len()).sum()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            pending_particles: self.pending_particle_count(),
            memory_bytes: self.entries.values().map(CacheEntry::memory_size).sum(),
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle(tag: f32) -> Particle {
        Particle::new(tag, 0.0, 1.0, 1.0, 0)
    }

    #[test]
    fn test_get_or_create_keeps_existing() {
        let mut cache = UnloadedChunkCache::new();
        let c = GridCoord::new(1, -1);
        cache.get_or_create(c).pending_particles.push(particle(1.0));
        cache.get_or_create(c).pending_particles.push(particle(2.0));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.pending_particle_count(), 2);
        assert_eq!(cache.stats().created, 1);
        assert!(cache.get(c).map_or(false, |e| e.height_field.is_none()));
    }

    #[test]
    fn test_store_unloaded_appends_inbox_after_pending() {
        let mut cache = UnloadedChunkCache::new();
        let c = GridCoord::new(0, 0);
        cache.get_or_create(c).pending_particles.push(particle(1.0));
        cache.store_unloaded(c, HeightField::new(33, 33), true, vec![particle(2.0)]);

        let entry = cache.take(c).unwrap();
        assert!(entry.initial_particles_dropped);
        assert!(entry.height_field.is_some());
        let order: Vec<f32> = entry.pending_particles.iter().map(|p| p.position[0]).collect();
        assert_eq!(order, vec![1.0, 2.0]);
    }

    #[test]
    fn test_take_tracks_hits_and_misses() {
        let mut cache = UnloadedChunkCache::new();
        cache.get_or_create(GridCoord::new(2, 2));
        assert!(cache.take(GridCoord::new(2, 2)).is_some());
        assert!(cache.take(GridCoord::new(2, 2)).is_none());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < 1e-6);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_reports_dropped_particles() {
        let mut cache = UnloadedChunkCache::new();
        cache.get_or_create(GridCoord::new(0, 1)).pending_particles.extend([particle(0.0), particle(1.0)]);
        cache.get_or_create(GridCoord::new(5, 5));
        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().cleared, 2);
    }
}
