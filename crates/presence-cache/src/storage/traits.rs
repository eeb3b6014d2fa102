//! Storage capability traits.

use bytes::Bytes;

use crate::error::Result;

/// Durable key/value backend consulted by [`crate::PresenceCache`].
///
/// Implementations carry their own concurrency control; every method takes
/// `&self` and may be called from many threads at once.
pub trait Storage: Send + Sync {
    /// Removes every element.
    fn clear(&self);

    /// Stores `data` under `key`.
    ///
    /// `overwrite` tells the backend the key is already present.
    fn insert(&self, key: &[u8], data: &[u8], overwrite: bool);

    /// Removes `key`. Returns `true` if an element was removed.
    fn erase(&self, key: &[u8]) -> bool;

    /// Looks `key` up and calls `found(key, value)` on a hit. Not called on a miss.
    fn retrieve(&self, key: &[u8], found: &mut dyn FnMut(&[u8], &[u8]));

    /// Stores every `(key, value)` pair.
    fn bulk_insert(&self, entries: &[(Bytes, Bytes)]);

    /// Number of stored elements.
    fn count(&self) -> usize;

    /// Visits every element until `visit` returns `false`.
    ///
    /// Returns `true` if the walk reached the end.
    fn enumerate(&self, visit: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> bool;

    /// Opens an independent handle with the same logical content.
    fn clone_storage(&self) -> Self
    where
        Self: Sized;

    /// Opens a write batch. Writes until the matching
    /// [`end_write_batch`](Storage::end_write_batch) commit together.
    fn begin_write_batch(&self);

    /// Commits the innermost open write batch.
    fn end_write_batch(&self);

    /// Flushes buffered writes.
    fn flush(&self);
}

/// Opens [`Storage`] instances per logical database.
pub trait StorageFactory {
    /// Backend produced by this factory.
    type Storage: Storage;

    /// Opens the backend for database `db`.
    ///
    /// Every key already persisted is reported through `on_key_loaded`
    /// before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] if the backend cannot be opened.
    fn create(&self, db: u32, on_key_loaded: &mut dyn FnMut(&[u8])) -> Result<Self::Storage>;

    /// Whether lookups on this backend are costly enough to justify a
    /// presence index.
    fn is_slow(&self) -> bool;
}
