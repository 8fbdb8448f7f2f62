use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use lru::LruCache;
use parking_lot::{Condvar, Mutex, RwLock};

use super::range_reader::{check_range, RangeReader};
use crate::error::IoError;

/// Default block size: 256KB
/// Large enough to hold a segment header plus its directory entry in one read,
/// small enough that a tile payload spans only a handful of blocks.
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

/// Default cache capacity in number of blocks.
/// 100 blocks * 256KB = 25.6MB default cache size.
pub const DEFAULT_BLOCK_CACHE_CAPACITY: usize = 100;

/// Completion signal for a block fetch that other threads are waiting on.
struct InFlight {
    done: Mutex<bool>,
    cond: Condvar,
}

impl InFlight {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.cond.wait(&mut done);
        }
    }

    fn finish(&self) {
        *self.done.lock() = true;
        self.cond.notify_all();
    }
}

/// Block-based caching layer that wraps any RangeReader.
///
/// Opening a container touches many small, scattered ranges (segment headers
/// during a directory scan, then the directory and metadata segments). The
/// block cache turns those into fewer, larger reads.
///
/// Features:
/// - Fixed-size block cache (default 256KB blocks)
/// - LRU eviction when cache reaches capacity
/// - Singleflight: concurrent requests for the same block share one fetch
/// - Handles reads spanning multiple blocks
pub struct BlockCache<R> {
    /// The underlying reader
    inner: Arc<R>,
    /// Block size in bytes
    block_size: usize,
    /// Cached blocks indexed by block number
    cache: RwLock<LruCache<u64, Bytes>>,
    /// In-flight block fetches for singleflight pattern
    in_flight: Mutex<HashMap<u64, Arc<InFlight>>>,
}

impl<R: RangeReader> BlockCache<R> {
    /// Create a new BlockCache wrapping the given reader.
    ///
    /// Uses default block size (256KB) and cache capacity (100 blocks).
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_CACHE_CAPACITY)
    }

    /// Create a new BlockCache with custom block size and capacity.
    ///
    /// # Arguments
    /// * `inner` - The underlying reader to wrap
    /// * `block_size` - Size of each cached block in bytes (at least 1)
    /// * `capacity` - Maximum number of blocks to cache (at least 1)
    pub fn with_capacity(inner: R, block_size: usize, capacity: usize) -> Self {
        Self {
            inner: Arc::new(inner),
            block_size: block_size.max(1),
            cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Get a reference to the wrapped reader.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Get a block from cache or fetch it from the underlying reader.
    ///
    /// Implements the singleflight pattern: if multiple threads request the same
    /// block concurrently, only one fetch is performed and all share the result.
    fn get_block(&self, block_idx: u64) -> Result<Bytes, IoError> {
        loop {
            // Fast path: check cache
            if let Some(data) = self.cache.read().peek(&block_idx) {
                return Ok(data.clone());
            }

            // Slow path: wait on an in-flight fetch or become leader
            let flight = {
                let mut in_flight = self.in_flight.lock();

                if let Some(flight) = in_flight.get(&block_idx) {
                    let flight = flight.clone();
                    drop(in_flight);
                    flight.wait();
                    continue;
                }

                let flight = Arc::new(InFlight::new());
                in_flight.insert(block_idx, flight.clone());
                flight
            };

            let result = self.fetch_block_from_source(block_idx);

            {
                let mut cache = self.cache.write();
                let mut in_flight = self.in_flight.lock();

                if let Ok(ref data) = result {
                    cache.put(block_idx, data.clone());
                }

                in_flight.remove(&block_idx);
            }

            flight.finish();

            return result;
        }
    }

    /// Fetch a block directly from the underlying reader.
    fn fetch_block_from_source(&self, block_idx: u64) -> Result<Bytes, IoError> {
        let offset = block_idx * self.block_size as u64;
        let size = self.inner.size();

        // The last block may be short
        let remaining = size.saturating_sub(offset);
        if remaining == 0 {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: self.block_size as u64,
                size,
            });
        }

        let len = std::cmp::min(self.block_size as u64, remaining) as usize;
        self.inner.read_exact_at(offset, len)
    }

    #[inline]
    fn block_for_offset(&self, offset: u64) -> u64 {
        offset / self.block_size as u64
    }

    #[inline]
    fn offset_within_block(&self, offset: u64) -> usize {
        (offset % self.block_size as u64) as usize
    }
}

impl<R: RangeReader> RangeReader for BlockCache<R> {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.inner.size())?;

        if len == 0 {
            return Ok(Bytes::new());
        }

        let start_block = self.block_for_offset(offset);
        let end_block = self.block_for_offset(offset + len as u64 - 1);

        if start_block == end_block {
            let block = self.get_block(start_block)?;
            let block_offset = self.offset_within_block(offset);
            Ok(block.slice(block_offset..block_offset + len))
        } else {
            let mut result = BytesMut::with_capacity(len);
            let mut remaining = len;
            let mut current_offset = offset;

            for block_idx in start_block..=end_block {
                let block = self.get_block(block_idx)?;
                let block_offset = self.offset_within_block(current_offset);
                let bytes_in_block = std::cmp::min(block.len() - block_offset, remaining);

                result.extend_from_slice(&block[block_offset..block_offset + bytes_in_block]);

                remaining -= bytes_in_block;
                current_offset += bytes_in_block as u64;
            }

            Ok(result.freeze())
        }
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock reader for testing that tracks read calls
    struct MockReader {
        data: Bytes,
        read_count: AtomicUsize,
    }

    impl MockReader {
        fn new(data: Vec<u8>) -> Self {
            Self {
                data: Bytes::from(data),
                read_count: AtomicUsize::new(0),
            }
        }

        fn read_count(&self) -> usize {
            self.read_count.load(Ordering::SeqCst)
        }
    }

    impl RangeReader for MockReader {
        fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
            self.read_count.fetch_add(1, Ordering::SeqCst);
            check_range(offset, len, self.data.len() as u64)?;
            Ok(self.data.slice(offset as usize..offset as usize + len))
        }

        fn size(&self) -> u64 {
            self.data.len() as u64
        }

        fn identifier(&self) -> &str {
            "mock://test"
        }
    }

    #[test]
    fn test_single_block_read() {
        let data: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();
        let cache = BlockCache::with_capacity(MockReader::new(data.clone()), 256, 10);

        let result = cache.read_exact_at(50, 100).unwrap();
        assert_eq!(&result[..], &data[50..150]);
        assert_eq!(cache.inner().read_count(), 1);

        // Same block again: cache hit
        let result2 = cache.read_exact_at(10, 50).unwrap();
        assert_eq!(&result2[..], &data[10..60]);
        assert_eq!(cache.inner().read_count(), 1);
    }

    #[test]
    fn test_multi_block_read() {
        let data: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();
        let cache = BlockCache::with_capacity(MockReader::new(data.clone()), 256, 10);

        // Spans blocks 0 and 1
        let result = cache.read_exact_at(100, 300).unwrap();
        assert_eq!(&result[..], &data[100..400]);
        assert_eq!(cache.inner().read_count(), 2);
    }

    #[test]
    fn test_cache_eviction() {
        let data: Vec<u8> = (0..2048).map(|i| (i % 256) as u8).collect();
        let cache = BlockCache::with_capacity(MockReader::new(data), 256, 2);

        cache.read_exact_at(0, 10).unwrap();
        cache.read_exact_at(256, 10).unwrap();
        cache.read_exact_at(512, 10).unwrap(); // evicts block 0
        assert_eq!(cache.inner().read_count(), 3);

        cache.read_exact_at(300, 10).unwrap();
        assert_eq!(cache.inner().read_count(), 3);

        cache.read_exact_at(0, 10).unwrap();
        assert_eq!(cache.inner().read_count(), 4);
    }

    #[test]
    fn test_concurrent_reads_share_fetch() {
        let data: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();
        let cache = Arc::new(BlockCache::with_capacity(MockReader::new(data.clone()), 256, 10));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let cache = cache.clone();
                let expected = &data[50..150];
                scope.spawn(move || {
                    let bytes = cache.read_exact_at(50, 100).unwrap();
                    assert_eq!(&bytes[..], expected);
                });
            }
        });

        assert_eq!(cache.inner().read_count(), 1);
    }

    #[test]
    fn test_out_of_bounds() {
        let cache = BlockCache::with_capacity(MockReader::new(vec![1, 2, 3, 4, 5]), 256, 10);
        let result = cache.read_exact_at(3, 10);
        assert!(matches!(result, Err(IoError::RangeOutOfBounds { .. })));
    }

    #[test]
    fn test_zero_length_read() {
        let cache = BlockCache::with_capacity(MockReader::new(vec![1, 2, 3, 4, 5]), 256, 10);
        assert!(cache.read_exact_at(0, 0).unwrap().is_empty());
        assert_eq!(cache.inner().read_count(), 0);
    }

    #[test]
    fn test_last_partial_block() {
        let data: Vec<u8> = (0..300).map(|i| (i % 256) as u8).collect();
        let cache = BlockCache::with_capacity(MockReader::new(data.clone()), 256, 10);
        let result = cache.read_exact_at(260, 30).unwrap();
        assert_eq!(&result[..], &data[260..290]);
    }
}
