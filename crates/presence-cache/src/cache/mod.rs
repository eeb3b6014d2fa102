//! Presence-index cache.
//!
//! - [`PresenceCache`]: storage wrapper short-circuiting lookups of absent keys
//! - [`PresenceStats`]: lookup counters and index shape
//! - [`WriteBatch`]: scope guard for a storage write batch
//!
//! # Thread-Safety & Lock Ordering
//!
//! The presence index sits behind a `parking_lot::Mutex` inside an
//! `arc_swap::ArcSwapOption`, so an emergency teardown can detach it without
//! taking the lock. Storage locks are never acquired while the index lock is
//! held, except in `clear` and in `count`'s non-blocking self-check.

mod index;
mod presence;
mod stats;

pub use presence::{PresenceCache, WriteBatch};
pub use stats::PresenceStats;
