//! Bounded metatile cache.
//!
//! This module stores rendered metatiles by [`MetatileKey`] and bounds the
//! number of entries.
//!
//! # Batch Eviction
//!
//! When an insertion finds the cache full (`len >= capacity`), all entries
//! are sorted by last access and the oldest are dropped until fewer than
//! `capacity / 2` remain. The new entry is inserted afterwards. Sorting the
//! whole cache once per batch keeps the bookkeeping trivial at the cost of
//! a looser memory bound than a strict LRU: right after a batch the cache
//! holds about half its capacity.
//!
//! # Access Clock
//!
//! Access stamps come from a per-cache monotonic clock (nanoseconds since
//! the cache was created). Two stamps handed out by the same cache are
//! always strictly increasing, so eviction order is total.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::debug;

use super::coords::MetatileKey;
use super::metatile::Metatile;

/// Default number of metatiles kept in memory.
pub const DEFAULT_METATILE_CACHE_CAPACITY: usize = 15;

// =============================================================================
// Metatile Cache
// =============================================================================

/// Count-bounded cache of rendered metatiles.
///
/// # Thread Safety
///
/// Lookups share a read lock and may run in parallel. [`touch`](Self::touch)
/// only writes the entry's atomic stamp. [`put`](Self::put) and the eviction
/// scan take the write lock, so they exclude each other and all readers.
///
/// # Example
///
/// ```
/// use image::RgbaImage;
/// use metatile_server::tile::{encode, Metatile, MetatileCache};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() {
///     let cache = MetatileCache::with_capacity(15);
///
///     let origin = encode(9, 12, 10, 3).unwrap();
///     let image = RgbaImage::new(2048, 2048);
///     cache
///         .put(Arc::new(Metatile::new(origin, 10, 3, image, cache.now())))
///         .await;
///
///     let hit = cache.get(&origin.key).await.unwrap();
///     cache.touch(&hit);
///     assert_eq!(cache.len().await, 1);
/// }
/// ```
pub struct MetatileCache {
    entries: RwLock<HashMap<MetatileKey, Arc<Metatile>>>,

    /// Maximum number of entries
    capacity: usize,

    /// Origin of the access clock
    epoch: Instant,

    /// Last stamp handed out, keeps the clock strictly increasing
    last_stamp: AtomicU64,
}

impl MetatileCache {
    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_METATILE_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `capacity` metatiles.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(capacity)),
            capacity: capacity.max(1),
            epoch: Instant::now(),
            last_stamp: AtomicU64::new(0),
        }
    }

    /// Current access stamp.
    pub fn now(&self) -> u64 {
        let elapsed = self.epoch.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
        let previous = self
            .last_stamp
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(elapsed.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        elapsed.max(previous + 1)
    }

    /// Look up a metatile without changing its access stamp.
    pub async fn get(&self, key: &MetatileKey) -> Option<Arc<Metatile>> {
        let entries = self.entries.read().await;
        entries.get(key).cloned()
    }

    /// Mark a metatile as used now.
    pub fn touch(&self, metatile: &Metatile) {
        metatile.touch_at(self.now());
    }

    /// Check if a metatile is cached.
    pub async fn contains(&self, key: &MetatileKey) -> bool {
        let entries = self.entries.read().await;
        entries.contains_key(key)
    }

    /// Insert a metatile, running batch eviction first if the cache is full.
    ///
    /// An existing entry with the same key is replaced.
    pub async fn put(&self, metatile: Arc<Metatile>) {
        let mut entries = self.entries.write().await;

        if entries.len() >= self.capacity {
            let evicted = evict_oldest(&mut entries, self.capacity / 2);
            debug!(
                evicted,
                remaining = entries.len(),
                capacity = self.capacity,
                "Evicted metatile batch"
            );
        }

        entries.insert(metatile.key(), metatile);
    }

    /// Remove every cached metatile.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }

    /// Get the current number of cached metatiles.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }

    /// Check if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        let entries = self.entries.read().await;
        entries.is_empty()
    }

    /// Get the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MetatileCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop least recently accessed entries while `len >= floor`.
///
/// Returns the number of evicted entries.
fn evict_oldest(entries: &mut HashMap<MetatileKey, Arc<Metatile>>, floor: usize) -> usize {
    let mut by_age: Vec<(u64, MetatileKey)> = entries
        .values()
        .map(|metatile| (metatile.last_access(), metatile.key()))
        .collect();
    by_age.sort_unstable_by_key(|(stamp, _)| *stamp);

    let mut evicted = 0;
    for (_, key) in by_age {
        if entries.len() < floor.max(1) {
            break;
        }
        entries.remove(&key);
        evicted += 1;
    }
    evicted
}

// =============================================================================
// Tests
// =============================================================================
