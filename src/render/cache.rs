//! Cache of decoded subblocks.
//!
//! Region reads that overlap, or repeated reads of the same region, hit the
//! same subblocks. Decoding dominates their cost, so decoded pixel buffers
//! are kept in an LRU cache keyed by directory index.
//!
//! # Size-Based Eviction
//!
//! The cache tracks the total size of the cached buffers in bytes and evicts
//! least-recently-used entries when the capacity is exceeded. A buffer larger
//! than the whole capacity is never cached.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::pixel::PixelBuffer;

/// Default cache capacity: 256MB
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

/// Bound on entries, to keep LRU bookkeeping small
const DEFAULT_MAX_ENTRIES: usize = 10_000;

struct Inner {
    entries: LruCache<usize, Arc<PixelBuffer>>,
    size: usize,
}

/// LRU cache of decoded subblocks with a byte capacity.
///
/// Thread-safe; shared by every region read of a container.
pub struct TileCache {
    inner: Mutex<Inner>,
    max_size: usize,
}

impl TileCache {
    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `max_size` bytes of pixels.
    ///
    /// A capacity of 0 disables caching.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(max_entries),
                size: 0,
            }),
            max_size,
        }
    }

    /// Look up the decoded subblock at directory `index`, marking it recently used.
    pub fn get(&self, index: usize) -> Option<Arc<PixelBuffer>> {
        self.inner.lock().entries.get(&index).cloned()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.inner.lock().entries.contains(&index)
    }

    /// Store a decoded subblock, evicting least-recently-used entries as needed.
    pub fn put(&self, index: usize, buffer: Arc<PixelBuffer>) {
        let buffer_size = buffer.data().len();
        if buffer_size > self.max_size {
            return;
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(old) = inner.entries.peek(&index) {
            inner.size = inner.size.saturating_sub(old.data().len());
        }

        // `push` also reports an entry dropped by the entry-count bound
        if let Some((evicted_index, evicted)) = inner.entries.push(index, buffer) {
            if evicted_index != index {
                inner.size = inner.size.saturating_sub(evicted.data().len());
            }
        }
        inner.size += buffer_size;

        while inner.size > self.max_size {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => inner.size = inner.size.saturating_sub(evicted.data().len()),
                None => break,
            }
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.size = 0;
    }

    /// Number of cached subblocks.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently cached.
    pub fn size(&self) -> usize {
        self.inner.lock().size
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}
