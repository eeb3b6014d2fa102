//! # Presence Cache
//!
//! Presence-index cache in front of a key-value storage backend.
//!
//! A [`PresenceCache`] wraps any [`Storage`] implementation and, when enabled,
//! keeps a compact hash-presence index of every stored key. Lookups for keys
//! the index has never seen return immediately without touching storage,
//! which matters when storage is slow (disk or flash backed).
//!
//! ## Features
//!
//! - **Negative-lookup shortcut**: absent keys never reach the backend
//! - **Collision-aware index**: keys sharing a hash share one bucket
//! - **Self-checking**: `count()` verifies the index against storage when idle
//! - **Emergency teardown**: the index can be detached and released on a
//!   background worker under memory pressure
//!
//! ## Quick Start
//!
//! ```rust
//! use presence_cache::{MemoryStorage, PresenceCache};
//!
//! let cache = PresenceCache::new(MemoryStorage::new(), true);
//! cache.insert(b"user:1", b"alice", false);
//!
//! assert_eq!(cache.get(b"user:1").as_deref(), Some(&b"alice"[..]));
//! assert!(cache.get(b"user:2").is_none());
//! assert_eq!(cache.stats().negative_hits, 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::significant_drop_in_scrutinee)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::manual_assert)]

pub mod cache;
pub mod config;
pub mod error;
pub mod locks;
pub mod reclaim;
#[cfg(test)]
mod reclaim_tests;
pub mod storage;

pub use cache::{PresenceCache, PresenceStats, WriteBatch};
pub use config::{CacheConfig, ConfigError, KeyCacheMode, PresenceConfig, ReclaimerConfig};
pub use error::{Error, Result};
pub use locks::{GlobalLock, GlobalLockGuard, GlobalLocks};
pub use reclaim::{AsyncWorkQueue, DeferredWork, Job};
pub use storage::{MemoryStorage, MemoryStorageFactory, Storage, StorageFactory};
