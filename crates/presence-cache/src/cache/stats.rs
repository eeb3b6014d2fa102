//! Presence cache statistics.

#![allow(clippy::cast_precision_loss)] // Precision loss acceptable for rate calculation

/// Point-in-time view of a presence cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceStats {
    /// Lookups answered "absent" by the index without touching storage.
    pub negative_hits: u64,
    /// Lookups forwarded to storage.
    pub backend_lookups: u64,
    /// Buckets in the presence index (0 when indexing is off).
    pub buckets: usize,
    /// Keys hidden behind a shared bucket.
    pub collisions: usize,
}

impl PresenceStats {
    /// Fraction of lookups short-circuited by the index (0.0 to 1.0).
    #[must_use]
    pub fn shortcut_rate(&self) -> f64 {
        let total = self.negative_hits + self.backend_lookups;
        if total == 0 {
            0.0
        } else {
            self.negative_hits as f64 / total as f64
        }
    }

    /// Keys the index accounts for.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.buckets + self.collisions
    }
}
