//! Presence cache in front of a storage backend.
//!
//! # Locking
//!
//! The index lock covers the presence index and its collision counter only.
//! Mutators update the index in a short critical section and call storage
//! after releasing it. `erase` runs the other way round because the index
//! update depends on what storage reports. `clear` is the one operation that
//! holds the lock across the storage call.

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, trace, warn};

use super::index::PresenceIndex;
use super::stats::PresenceStats;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::locks::GlobalLocks;
use crate::reclaim::DeferredWork;
use crate::storage::{Storage, StorageFactory};

type SharedIndex = Arc<Mutex<PresenceIndex>>;

/// Storage wrapper that answers lookups of absent keys without a storage
/// round-trip.
///
/// With indexing enabled, every key stored through the cache has its hash
/// registered in a presence index. A lookup whose hash is not registered is
/// a guaranteed miss. A registered hash may still miss in storage when two
/// keys share it.
///
/// Callers uphold two preconditions the index relies on: an insert without
/// `overwrite` names a key not yet stored, and an insert with `overwrite`
/// names a key already stored.
pub struct PresenceCache<S, H = FxBuildHasher> {
    storage: S,
    /// `None` when indexing is disabled or after an emergency teardown.
    index: ArcSwapOption<Mutex<PresenceIndex>>,
    hasher: H,
    /// Writes whose index update and storage call have not both landed.
    writes_in_flight: AtomicUsize,
    negative_hits: AtomicU64,
    backend_lookups: AtomicU64,
}

/// Marks a write whose index update and storage call are not yet both visible.
struct PendingWrite<'a>(&'a AtomicUsize);

impl<'a> PendingWrite<'a> {
    fn begin(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingWrite<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<S: Storage> PresenceCache<S> {
    /// Wraps `storage`, keeping a presence index if `key_cache` is set.
    #[must_use]
    pub fn new(storage: S, key_cache: bool) -> Self {
        Self::with_hasher(storage, key_cache, FxBuildHasher)
    }

    /// Opens database `db` through `factory` and indexes every key it loads.
    ///
    /// `on_key_loaded` sees each loaded key after it has been indexed.
    ///
    /// # Errors
    ///
    /// Returns the factory's error if the backend cannot be opened.
    pub fn create<F>(
        factory: &F,
        db: u32,
        config: &CacheConfig,
        on_key_loaded: impl FnMut(&[u8]),
    ) -> Result<Self>
    where
        F: StorageFactory<Storage = S>,
    {
        Self::create_with_hasher(factory, db, config, FxBuildHasher, on_key_loaded)
    }
}

impl<S, H> PresenceCache<S, H>
where
    S: Storage,
    H: BuildHasher + Clone,
{
    /// Like [`PresenceCache::new`] with a custom key hasher.
    #[must_use]
    pub fn with_hasher(storage: S, key_cache: bool, hasher: H) -> Self {
        let index = key_cache.then(PresenceIndex::default);
        Self::from_parts(storage, index, hasher)
    }

    /// Like [`PresenceCache::create`] with a custom key hasher.
    ///
    /// # Errors
    ///
    /// Returns the factory's error if the backend cannot be opened.
    pub fn create_with_hasher<F>(
        factory: &F,
        db: u32,
        config: &CacheConfig,
        hasher: H,
        mut on_key_loaded: impl FnMut(&[u8]),
    ) -> Result<Self>
    where
        F: StorageFactory<Storage = S>,
    {
        let key_cache = config.key_cache.resolve(factory.is_slow());
        let mut index = key_cache.then(|| PresenceIndex::with_capacity(config.index_capacity));

        let storage = factory.create(db, &mut |key| {
            if let Some(index) = index.as_mut() {
                index.cache_hash(hasher.hash_one(key));
            }
            on_key_loaded(key);
        })?;

        info!(
            db,
            key_cache,
            keys = storage.count(),
            buckets = index.as_ref().map_or(0, PresenceIndex::len),
            "presence cache opened"
        );
        Ok(Self::from_parts(storage, index, hasher))
    }

    fn from_parts(storage: S, index: Option<PresenceIndex>, hasher: H) -> Self {
        Self {
            storage,
            index: ArcSwapOption::new(index.map(|index| Arc::new(Mutex::new(index)))),
            hasher,
            writes_in_flight: AtomicUsize::new(0),
            negative_hits: AtomicU64::new(0),
            backend_lookups: AtomicU64::new(0),
        }
    }

    #[inline]
    fn hash_key(&self, key: &[u8]) -> u64 {
        self.hasher.hash_one(key)
    }

    /// Returns true while a presence index is kept.
    #[must_use]
    pub fn keycache_is_enabled(&self) -> bool {
        self.index.load().is_some()
    }

    /// The wrapped backend.
    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Stores `data` under `key`.
    ///
    /// Without `overwrite` the key is registered in the index before storage
    /// sees it. An overwrite leaves the index alone.
    pub fn insert(&self, key: &[u8], data: &[u8], overwrite: bool) {
        let _pending = PendingWrite::begin(&self.writes_in_flight);
        if !overwrite {
            if let Some(index) = &*self.index.load() {
                let hash = self.hash_key(key);
                if index.lock().cache_hash(hash) {
                    debug!(hash, "key shares a presence bucket");
                }
            }
        }
        self.storage.insert(key, data, overwrite);
    }

    /// Stores every `(key, value)` pair, registering all keys first.
    pub fn bulk_insert(&self, entries: &[(Bytes, Bytes)]) {
        let _pending = PendingWrite::begin(&self.writes_in_flight);
        if let Some(index) = &*self.index.load() {
            let hashes: Vec<u64> = entries.iter().map(|(key, _)| self.hash_key(key)).collect();
            let mut index = index.lock();
            let collided = hashes.into_iter().filter(|&h| index.cache_hash(h)).count();
            if collided > 0 {
                debug!(
                    collided,
                    entries = entries.len(),
                    "bulk insert folded keys into shared buckets"
                );
            }
        }
        self.storage.bulk_insert(entries);
    }

    /// Removes `key` from storage and, if storage removed it, from the index.
    ///
    /// Returns what storage reported.
    ///
    /// # Panics
    ///
    /// Panics if storage erased a key the index never registered.
    pub fn erase(&self, key: &[u8]) -> bool {
        let _pending = PendingWrite::begin(&self.writes_in_flight);
        let erased = self.storage.erase(key);
        if erased {
            if let Some(index) = &*self.index.load() {
                let hash = self.hash_key(key);
                index.lock().forget_hash(hash);
            }
        }
        erased
    }

    /// Looks `key` up, calling `found(key, value)` on a hit.
    ///
    /// If the index proves the key absent, storage is not consulted and
    /// `found` is not called. Against a concurrent `erase` of the same key,
    /// `found` may or may not observe the erased value.
    pub fn retrieve<F>(&self, key: &[u8], mut found: F)
    where
        F: FnMut(&[u8], &[u8]),
    {
        if let Some(index) = &*self.index.load() {
            let hash = self.hash_key(key);
            if !index.lock().contains(hash) {
                self.negative_hits.fetch_add(1, Ordering::Relaxed);
                trace!(hash, "lookup short-circuited by presence index");
                return;
            }
        }
        self.backend_lookups.fetch_add(1, Ordering::Relaxed);
        self.storage.retrieve(key, &mut found);
    }

    /// Owned-value form of [`retrieve`](Self::retrieve).
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let mut value = None;
        self.retrieve(key, |_, v| value = Some(Bytes::copy_from_slice(v)));
        value
    }

    /// Number of elements in storage.
    ///
    /// When the index lock is free and no write is in flight on either side
    /// of the storage read, also checks that the index accounts for exactly
    /// that many keys.
    ///
    /// # Panics
    ///
    /// Panics if the index has drifted from storage.
    #[must_use]
    pub fn count(&self) -> usize {
        let guard = self.index.load();
        let Some(index) = &*guard else {
            return self.storage.count();
        };
        let Some(index) = index.try_lock() else {
            return self.storage.count();
        };

        // Writers that touched the index before we locked it must have landed
        // in storage; an erase starting after that stays in flight until we unlock.
        let settled_before = self.writes_in_flight.load(Ordering::SeqCst) == 0;
        let count = self.storage.count();
        let settled = settled_before && self.writes_in_flight.load(Ordering::SeqCst) == 0;
        assert!(
            !settled || count == index.tracked_keys(),
            "presence index drifted from storage: storage holds {count} elements, \
             index accounts for {} ({} buckets + {} collisions)",
            index.tracked_keys(),
            index.len(),
            index.collisions()
        );
        count
    }

    /// Empties the index and storage together.
    ///
    /// Must not run concurrently with writers.
    pub fn clear(&self) {
        match &*self.index.load() {
            Some(index) => {
                let mut index = index.lock();
                index.clear();
                self.storage.clear();
            }
            None => self.storage.clear(),
        }
    }

    /// Opens an unindexed cache over a clone of the backend.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        Self::with_hasher(self.storage.clone_storage(), false, self.hasher.clone())
    }

    /// Visits every stored element until `visit` returns `false`.
    ///
    /// Returns `true` if the walk reached the end.
    pub fn enumerate<F>(&self, mut visit: F) -> bool
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.storage.enumerate(&mut visit)
    }

    /// Flushes buffered storage writes.
    pub fn flush(&self) {
        self.storage.flush();
    }

    /// Opens a storage write batch, committed when the returned guard drops.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not hold `locks`; opening a batch
    /// without it would deadlock.
    pub fn begin_write_batch<L>(&self, locks: &L) -> WriteBatch<'_, S>
    where
        L: GlobalLocks + ?Sized,
    {
        assert!(
            locks.acquired(),
            "write batch opened without the global lock; this would deadlock"
        );
        self.storage.begin_write_batch();
        debug!("write batch opened");
        WriteBatch {
            storage: &self.storage,
        }
    }

    /// Detaches the presence index and hands it to `queue` for release.
    ///
    /// The cache behaves as unindexed afterwards. The deferred job waits for
    /// operations still holding the detached index before releasing it.
    /// Returns `false` if there was no index to detach.
    pub fn emergency_free_cache<W>(&self, queue: &W) -> bool
    where
        W: DeferredWork + ?Sized,
    {
        let Some(detached) = self.index.swap(None) else {
            return false;
        };

        warn!("presence index detached for deferred release");
        if let Err(job) = queue.add_work(Box::new(move || release_when_quiescent(detached))) {
            // Releasing here is what the caller cannot afford; leak instead.
            error!("deferred work queue rejected the presence index; leaking it");
            std::mem::forget(job);
        }
        true
    }

    /// Current counters and index shape.
    #[must_use]
    pub fn stats(&self) -> PresenceStats {
        let (buckets, collisions) = match &*self.index.load() {
            Some(index) => {
                let index = index.lock();
                (index.len(), index.collisions())
            }
            None => (0, 0),
        };

        PresenceStats {
            negative_hits: self.negative_hits.load(Ordering::Relaxed),
            backend_lookups: self.backend_lookups.load(Ordering::Relaxed),
            buckets,
            collisions,
        }
    }

    /// Weak handle on the attached index, for observing its release.
    #[cfg(test)]
    pub(super) fn index_handle(&self) -> Option<std::sync::Weak<Mutex<PresenceIndex>>> {
        self.index.load_full().as_ref().map(Arc::downgrade)
    }
}

/// Releases `index` once no other holder remains.
fn release_when_quiescent(mut index: SharedIndex) {
    loop {
        match Arc::try_unwrap(index) {
            Ok(last) => {
                let buckets = last.into_inner().len();
                debug!(buckets, "detached presence index released");
                return;
            }
            Err(shared) => {
                index = shared;
                thread::yield_now();
            }
        }
    }
}

/// Open storage write batch. Dropping it commits the batch.
#[must_use = "dropping the batch commits it immediately"]
pub struct WriteBatch<'a, S: Storage> {
    storage: &'a S,
}

impl<S: Storage> WriteBatch<'_, S> {
    /// Commits the batch.
    pub fn commit(self) {
        drop(self);
    }
}

impl<S: Storage> Drop for WriteBatch<'_, S> {
    fn drop(&mut self) {
        self.storage.end_write_batch();
        debug!("write batch committed");
    }
}
