//! Presence index: key hash -> number of live keys sharing that hash.
//!
//! Key bytes are never stored. A bucket answers "some key with this hash may
//! be present"; a missing bucket answers "no such key is present".

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::{BuildHasherDefault, Hasher};

/// Pass-through hasher for keys that are already hashes.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct IdentityHasher(u64);

impl Hasher for IdentityHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        // Only `u64` keys are hashed through this type; fold anything else.
        for &b in bytes {
            self.0 = self.0.rotate_left(8) ^ u64::from(b);
        }
    }

    #[inline]
    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }
}

type IdentityBuildHasher = BuildHasherDefault<IdentityHasher>;

/// Multiplicity table behind the presence cache.
///
/// Invariant: every bucket count is >= 1, and `collisions` equals the sum of
/// `count - 1` over all buckets.
#[derive(Debug, Default)]
pub(crate) struct PresenceIndex {
    buckets: HashMap<u64, u64, IdentityBuildHasher>,
    collisions: usize,
}

impl PresenceIndex {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buckets: HashMap::with_capacity_and_hasher(capacity, IdentityBuildHasher::default()),
            collisions: 0,
        }
    }

    /// Registers one more key with this hash.
    ///
    /// Returns `true` if the hash already had a bucket, i.e. the key now
    /// shares it with another one.
    pub(crate) fn cache_hash(&mut self, hash: u64) -> bool {
        match self.buckets.entry(hash) {
            Entry::Vacant(slot) => {
                slot.insert(1);
                false
            }
            Entry::Occupied(mut slot) => {
                *slot.get_mut() += 1;
                self.collisions += 1;
                true
            }
        }
    }

    /// Returns true if some key with this hash may be present.
    #[inline]
    pub(crate) fn contains(&self, hash: u64) -> bool {
        self.buckets.contains_key(&hash)
    }

    /// Unregisters one key with this hash.
    ///
    /// # Panics
    ///
    /// Panics if no bucket exists for `hash`: the index has drifted from the
    /// backend.
    pub(crate) fn forget_hash(&mut self, hash: u64) {
        let Entry::Occupied(mut slot) = self.buckets.entry(hash) else {
            panic!("presence index has no bucket for erased key hash {hash:#018x}");
        };

        let count = slot.get_mut();
        assert!(*count >= 1, "presence bucket {hash:#018x} holds a zero count");
        *count -= 1;
        if *count == 0 {
            slot.remove();
        } else {
            self.collisions -= 1;
        }
    }

    /// Number of buckets.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Keys hidden behind a shared bucket.
    #[inline]
    pub(crate) fn collisions(&self) -> usize {
        self.collisions
    }

    /// Number of keys the index accounts for.
    #[inline]
    pub(crate) fn tracked_keys(&self) -> usize {
        self.buckets.len() + self.collisions
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.clear();
        self.collisions = 0;
    }
}
