use crate::core::geom::TileCoord;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

const DEFAULT_CAPACITY: usize = 512;

/// LRU cache of fetched tile image bytes.
///
/// Bytes are shared via `Arc` so the cache and the render surface never copy
/// the payload.
pub struct TileCache {
    cache: LruCache<TileCoord, Arc<Vec<u8>>>,
}

impl TileCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, coord: &TileCoord) -> Option<Arc<Vec<u8>>> {
        self.cache.get(coord).cloned()
    }

    pub fn insert(&mut self, coord: TileCoord, data: Arc<Vec<u8>>) {
        self.cache.put(coord, data);
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.cache.contains(coord)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut cache = TileCache::new();
        let coord = TileCoord::new(2, 1, 1);
        assert!(cache.get(&coord).is_none());

        cache.insert(coord, Arc::new(vec![1, 2, 3]));
        assert_eq!(cache.get(&coord).unwrap().as_slice(), &[1, 2, 3]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = TileCache::with_capacity(2);
        cache.insert(TileCoord::new(0, 0, 0), Arc::new(vec![0]));
        cache.insert(TileCoord::new(1, 0, 0), Arc::new(vec![1]));

        // Touch the first entry so the second becomes least recently used
        cache.get(&TileCoord::new(0, 0, 0));
        cache.insert(TileCoord::new(2, 0, 0), Arc::new(vec![2]));

        assert!(cache.contains(&TileCoord::new(0, 0, 0)));
        assert!(!cache.contains(&TileCoord::new(1, 0, 0)));
    }
}
