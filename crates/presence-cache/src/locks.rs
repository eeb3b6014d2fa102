//! Process-wide exclusivity used to guard write batches.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

/// Reports whether the current thread holds the surrounding system's
/// exclusive lock.
pub trait GlobalLocks {
    /// Returns true if the calling thread holds the lock.
    fn acquired(&self) -> bool;
}

/// Guard returned by [`GlobalLock::lock`].
pub type GlobalLockGuard<'a> = ReentrantMutexGuard<'a, ()>;

/// Reentrant process-wide lock.
///
/// A thread may lock it repeatedly; other threads block until every guard
/// held by the owner has been dropped.
pub struct GlobalLock {
    inner: ReentrantMutex<()>,
}

impl GlobalLock {
    /// Creates an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: ReentrantMutex::new(()),
        }
    }

    /// Blocks until the lock is held by the calling thread.
    pub fn lock(&self) -> GlobalLockGuard<'_> {
        self.inner.lock()
    }

    /// Takes the lock if no other thread holds it.
    #[must_use]
    pub fn try_lock(&self) -> Option<GlobalLockGuard<'_>> {
        self.inner.try_lock()
    }
}

impl Default for GlobalLock {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalLocks for GlobalLock {
    fn acquired(&self) -> bool {
        self.inner.is_owned_by_current_thread()
    }
}

impl std::fmt::Debug for GlobalLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalLock")
            .field("locked", &self.inner.is_locked())
            .finish()
    }
}
