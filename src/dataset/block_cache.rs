//! Block cache for computed output.
//!
//! One pipeline run fills a block of every output band; each band keeps its
//! own LRU of those blocks, keyed by block column and row.

use std::num::NonZeroUsize;

use bytes::Bytes;
use lru::LruCache;

/// Per-band LRU cache of computed output blocks.
///
/// Blocks are stored as full-size blocks in the band's data type; edge
/// blocks occupy their top-left corner.
pub struct BlockCache {
    bands: Vec<LruCache<(usize, usize), Bytes>>,
    capacity: NonZeroUsize,
}

impl BlockCache {
    pub fn new(band_count: usize, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            bands: (0..band_count).map(|_| LruCache::new(capacity)).collect(),
            capacity,
        }
    }

    /// Blocks kept per band.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn get(&mut self, band: usize, block_x: usize, block_y: usize) -> Option<Bytes> {
        self.bands.get_mut(band)?.get(&(block_x, block_y)).cloned()
    }

    pub fn put(&mut self, band: usize, block_x: usize, block_y: usize, data: Bytes) {
        if let Some(cache) = self.bands.get_mut(band) {
            cache.put((block_x, block_y), data);
        }
    }

    /// Number of cached blocks of `band`.
    pub fn len(&self, band: usize) -> usize {
        self.bands.get(band).map_or(0, LruCache::len)
    }

    pub fn clear(&mut self) {
        for cache in &mut self.bands {
            cache.clear();
        }
    }
}
