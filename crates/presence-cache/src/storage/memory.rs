//! In-memory storage backend.
//!
//! Thread-safe map used as the reference [`Storage`] implementation and as
//! the backend in tests and benchmarks.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

use super::traits::{Storage, StorageFactory};
use crate::error::{Error, Result};

/// In-memory key/value backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<FxHashMap<Bytes, Bytes>>,
    /// Nesting depth of open write batches.
    batch_depth: AtomicUsize,
    /// Number of committed outermost write batches.
    batches_committed: AtomicU64,
    flushes: AtomicU64,
}

impl MemoryStorage {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding `entries`.
    #[must_use]
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Bytes, Bytes)>,
    {
        let storage = Self::new();
        storage.entries.write().extend(entries);
        storage
    }

    /// Nesting depth of currently open write batches.
    #[must_use]
    pub fn batch_depth(&self) -> usize {
        self.batch_depth.load(Ordering::Acquire)
    }

    /// Number of outermost write batches committed so far.
    #[must_use]
    pub fn batches_committed(&self) -> u64 {
        self.batches_committed.load(Ordering::Relaxed)
    }

    /// Number of `flush` calls so far.
    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Returns true if `key` is stored.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.read().contains_key(key)
    }
}

impl Storage for MemoryStorage {
    fn clear(&self) {
        self.entries.write().clear();
    }

    fn insert(&self, key: &[u8], data: &[u8], _overwrite: bool) {
        self.entries
            .write()
            .insert(Bytes::copy_from_slice(key), Bytes::copy_from_slice(data));
    }

    fn erase(&self, key: &[u8]) -> bool {
        self.entries.write().remove(key).is_some()
    }

    fn retrieve(&self, key: &[u8], found: &mut dyn FnMut(&[u8], &[u8])) {
        // Clone the value out so the callback runs without the map lock.
        let hit = self
            .entries
            .read()
            .get_key_value(key)
            .map(|(k, v)| (k.clone(), v.clone()));
        if let Some((k, v)) = hit {
            found(&k, &v);
        }
    }

    fn bulk_insert(&self, entries: &[(Bytes, Bytes)]) {
        let mut map = self.entries.write();
        map.reserve(entries.len());
        for (key, value) in entries {
            map.insert(key.clone(), value.clone());
        }
    }

    fn count(&self) -> usize {
        self.entries.read().len()
    }

    fn enumerate(&self, visit: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> bool {
        let snapshot: Vec<(Bytes, Bytes)> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        snapshot.iter().all(|(k, v)| visit(k, v))
    }

    fn clone_storage(&self) -> Self {
        Self::from_entries(
            self.entries
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        )
    }

    fn begin_write_batch(&self) {
        self.batch_depth.fetch_add(1, Ordering::AcqRel);
    }

    fn end_write_batch(&self) {
        let previous = self.batch_depth.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "end_write_batch without a matching begin");
        if previous == 1 {
            self.batches_committed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Factory opening [`MemoryStorage`] instances, optionally pre-seeded per database.
///
/// Databases marked with [`with_failing_db`](Self::with_failing_db) refuse
/// to open, standing in for a backend that cannot be reached.
#[derive(Debug, Default)]
pub struct MemoryStorageFactory {
    slow: bool,
    seeds: Mutex<FxHashMap<u32, Vec<(Bytes, Bytes)>>>,
    failing: FxHashSet<u32>,
}

impl MemoryStorageFactory {
    /// Creates a factory. `slow` is reported through [`StorageFactory::is_slow`].
    #[must_use]
    pub fn new(slow: bool) -> Self {
        Self {
            slow,
            ..Self::default()
        }
    }

    /// Pre-seeds database `db`; the entries are loaded by the next `create(db, ..)`.
    #[must_use]
    pub fn with_entries<I>(self, db: u32, entries: I) -> Self
    where
        I: IntoIterator<Item = (Bytes, Bytes)>,
    {
        self.seeds.lock().entry(db).or_default().extend(entries);
        self
    }

    /// Makes every `create(db, ..)` fail with [`Error::Storage`].
    #[must_use]
    pub fn with_failing_db(mut self, db: u32) -> Self {
        self.failing.insert(db);
        self
    }
}

impl StorageFactory for MemoryStorageFactory {
    type Storage = MemoryStorage;

    fn create(&self, db: u32, on_key_loaded: &mut dyn FnMut(&[u8])) -> Result<MemoryStorage> {
        if self.failing.contains(&db) {
            return Err(Error::Storage(format!("database {db} could not be opened")));
        }

        let seed = self.seeds.lock().remove(&db).unwrap_or_default();
        let storage = MemoryStorage::new();
        {
            let mut map = storage.entries.write();
            for (key, value) in seed {
                // Duplicate seeds collapse into one element and are reported once.
                if map.insert(key.clone(), value).is_none() {
                    on_key_loaded(&key);
                }
            }
        }

        debug!(db, keys = storage.count(), "memory storage opened");
        Ok(storage)
    }

    fn is_slow(&self) -> bool {
        self.slow
    }
}
