use crate::core::constants::DEFAULT_TILE_CACHE_SIZE;
use crate::tiles::tile::Tile;
use lru::LruCache;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callback invoked for every tile a purge evicts
pub type RemoveFn<'a> = &'a mut dyn FnMut(&Tile);

struct CacheState {
    entries: LruCache<String, Tile>,
    size: usize,
}

impl CacheState {
    fn evict_overflow(&mut self) -> Vec<Tile> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.size {
            match self.entries.pop_lru() {
                Some((_, tile)) => evicted.push(tile),
                None => break,
            }
        }
        evicted
    }
}

/// In-memory tile cache keyed by tile hash, using LRU eviction.
///
/// The capacity is a soft bound: `add` may defer purging so that a whole
/// selection can be inserted before anything is evicted.
pub struct TileCache {
    cache: Arc<Mutex<CacheState>>,
}

impl TileCache {
    /// Create a new tile cache with the given capacity
    pub fn new(size: usize) -> Self {
        Self {
            cache: Arc::new(Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                size,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn size(&self) -> usize {
        self.lock().size
    }

    /// Change the capacity. Shrinking evicts the least recently used
    /// tiles straight away without calling any removal callback.
    pub fn set_size(&self, size: usize) {
        let evicted = {
            let mut cache = self.lock();
            cache.size = size;
            cache.evict_overflow()
        };
        if !evicted.is_empty() {
            log::debug!("Tile cache shrunk to {size}, dropped {} tiles", evicted.len());
        }
    }

    /// Look up a tile and mark it most recently used
    pub fn get(&self, hash: &str) -> Option<Tile> {
        self.lock().entries.get(hash).cloned()
    }

    /// Look up a tile without touching the access order
    pub fn peek(&self, hash: &str) -> Option<Tile> {
        self.lock().entries.peek(hash).cloned()
    }

    /// Insert `tile` as most recently used, replacing any tile with the same
    /// hash. Purges afterwards unless `no_purge` is set.
    pub fn add(&self, tile: Tile, remove_fn: Option<RemoveFn<'_>>, no_purge: bool) {
        self.lock().entries.push(tile.hash().to_string(), tile);
        if !no_purge {
            self.purge(remove_fn);
        }
    }

    /// Drop a tile without calling any removal callback
    pub fn remove(&self, hash: &str) -> bool {
        self.lock().entries.pop(hash).is_some()
    }

    /// Evict least recently used tiles until the cache fits its capacity.
    /// `remove_fn` runs for each evicted tile once the cache is unlocked.
    pub fn purge(&self, remove_fn: Option<RemoveFn<'_>>) -> usize {
        let evicted = self.lock().evict_overflow();
        let count = evicted.len();
        if let Some(remove_fn) = remove_fn {
            for tile in &evicted {
                remove_fn(tile);
            }
        }
        count
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.lock().entries.contains(hash)
    }

    /// Hashes from most to least recently used
    pub fn keys(&self) -> Vec<String> {
        self.lock().entries.iter().map(|(hash, _)| hash.clone()).collect()
    }

    /// Clear all tiles from the cache
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Get the current number of cached tiles
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for TileCache {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_CACHE_SIZE)
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.lock();
        f.debug_struct("TileCache")
            .field("size", &cache.size)
            .field("len", &cache.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::loader::{FnFetcher, TileRequest};
    use crate::tiles::tile::{TileDescriptor, TileFootprint, TileIndex};
    use crate::FetchError;
    use futures::FutureExt;

    fn tile(x: i64) -> Tile {
        let index = TileIndex::new(1, x, 0);
        let fetcher = Arc::new(FnFetcher::new(|_: TileRequest| {
            async { Err(FetchError::Other("offline".into())) }.boxed()
        }));
        Tile::new(
            TileDescriptor {
                footprint: TileFootprint {
                    index,
                    width: 256,
                    height: 256,
                    overlap_x: 0,
                    overlap_y: 0,
                    wrap_x: false,
                    wrap_y: false,
                },
                source: index,
                url: String::new(),
            },
            fetcher,
        )
    }

    #[test]
    fn test_tile_cache_basic_operations() {
        let cache = TileCache::new(2);
        let a = tile(1);
        let b = tile(2);

        // Initially empty
        assert!(cache.is_empty());
        assert_eq!(cache.len(), 0);

        cache.add(a.clone(), None, false);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(a.hash()));
        assert_eq!(cache.get(a.hash()), Some(a.clone()));

        cache.add(b.clone(), None, false);
        assert_eq!(cache.len(), 2);
        assert!(cache.remove(b.hash()));
        assert!(!cache.remove(b.hash()));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_tile_cache_lru_eviction() {
        let cache = TileCache::new(3);
        let tiles: Vec<Tile> = (0..5).map(tile).collect();
        let (a, b, c, d, e) = (&tiles[0], &tiles[1], &tiles[2], &tiles[3], &tiles[4]);
        let mut removed = Vec::new();

        for t in [a, b, c] {
            cache.add(t.clone(), Some(&mut |t: &Tile| removed.push(t.clone())), false);
        }
        assert!(cache.get(a.hash()).is_some());
        cache.add(d.clone(), Some(&mut |t: &Tile| removed.push(t.clone())), false);
        assert_eq!(removed, vec![b.clone()]);

        assert!(cache.peek(c.hash()).is_some());
        cache.add(e.clone(), Some(&mut |t: &Tile| removed.push(t.clone())), false);
        assert_eq!(removed, vec![b.clone(), c.clone()]);
        assert_eq!(
            cache.keys(),
            vec![e.hash().to_string(), d.hash().to_string(), a.hash().to_string()]
        );
    }

    #[test]
    fn test_fifth_tile_evicts_least_recent() {
        let cache = TileCache::new(4);
        let tiles: Vec<Tile> = (0..5).map(tile).collect();
        let mut removed = Vec::new();
        for t in &tiles[..4] {
            cache.add(t.clone(), Some(&mut |t: &Tile| removed.push(t.clone())), false);
        }
        assert_eq!(cache.len(), 4);
        assert!(removed.is_empty());

        cache.add(tiles[4].clone(), Some(&mut |t: &Tile| removed.push(t.clone())), false);
        assert_eq!(removed, vec![tiles[0].clone()]);
        assert_eq!(cache.len(), 4);
        assert!(!cache.contains(tiles[0].hash()));
        for t in &tiles[1..] {
            assert!(cache.contains(t.hash()));
        }
    }

    #[test]
    fn test_deferred_purge() {
        let cache = TileCache::new(1);
        for x in 0..3 {
            cache.add(tile(x), None, true);
        }
        assert_eq!(cache.len(), 3);
        let mut removed = 0;
        assert_eq!(cache.purge(Some(&mut |_: &Tile| removed += 1)), 2);
        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_shrinking_evicts_without_callback() {
        let cache = TileCache::new(4);
        let tiles: Vec<Tile> = (0..4).map(tile).collect();
        for t in &tiles {
            cache.add(t.clone(), None, false);
        }
        cache.set_size(2);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(tiles[3].hash()));
        assert!(cache.contains(tiles[2].hash()));
        assert!(!cache.contains(tiles[0].hash()));
    }

    #[test]
    fn test_add_replaces_same_hash() {
        let cache = TileCache::new(4);
        let first = tile(7);
        let second = tile(7);
        cache.add(first.clone(), None, false);
        cache.add(second.clone(), None, false);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek(first.hash()), Some(second));
    }
}
