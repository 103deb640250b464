use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::fingerprint::Fingerprint;

/// Per-cell budget charge beyond the payload itself (key, map node,
/// refcounts).
const CELL_OVERHEAD: usize = 128;

/// One decompressed block as held by the cache and by readers.
///
/// `compressed_size` is the number of bytes the block occupied in the
/// backing stream, needed to locate the block that follows it. Cells are
/// immutable once published.
#[derive(Debug)]
pub struct BlockCell {
    pub compressed_size: u64,
    pub data: Vec<u8>,
}

impl BlockCell {
    fn weight(&self) -> u64 {
        (self.data.len() + CELL_OVERHEAD) as u64
    }
}

/// Point-in-time counters for an [`UncompressedCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub weight_bytes: u64,
    pub capacity_bytes: u64,
}

struct Inner {
    map: LruCache<Fingerprint, Arc<BlockCell>>,
    weight: u64,
}

/// Process-wide cache of decompressed blocks, keyed by
/// [`Fingerprint`] and bounded by a byte budget.
///
/// Cells are shared out as `Arc`s, so a handle returned by [`get`] stays
/// valid regardless of concurrent eviction: eviction only drops the
/// cache's own reference, never the bytes a reader is still using.
///
/// [`get`]: UncompressedCache::get
pub struct UncompressedCache {
    inner: Mutex<Inner>,
    capacity: u64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl UncompressedCache {
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: LruCache::unbounded(),
                weight: 0,
            }),
            capacity: capacity_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns a live reference to the cell under `key`, refreshing its
    /// recency.
    pub fn get(&self, key: &Fingerprint) -> Option<Arc<BlockCell>> {
        let mut inner = self.inner.lock();
        match inner.map.get(key) {
            Some(cell) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(cell))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Publishes `cell` under `key` if absent.
    ///
    /// When a concurrent filler already published under the same key, the
    /// existing cell survives and this one is dropped without comparison:
    /// both fillers decompressed the same stored bytes.
    pub fn set(&self, key: Fingerprint, cell: Arc<BlockCell>) {
        let mut inner = self.inner.lock();
        if inner.map.contains(&key) {
            return;
        }

        inner.weight += cell.weight();
        inner.map.put(key, cell);

        while inner.weight > self.capacity {
            let Some((evicted_key, evicted)) = inner.map.pop_lru() else {
                break;
            };
            inner.weight -= evicted.weight();
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %evicted_key.to_hex(), size = evicted.data.len(), "evicted cell");
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently charged against the budget.
    pub fn weight(&self) -> u64 {
        self.inner.lock().weight
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: inner.map.len(),
            weight_bytes: inner.weight,
            capacity_bytes: self.capacity,
        }
    }
}
