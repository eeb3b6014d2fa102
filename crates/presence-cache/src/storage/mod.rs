//! Storage backends behind the presence cache.
//!
//! # Public Types
//!
//! - [`Storage`], [`StorageFactory`]: backend capability traits
//! - [`MemoryStorage`], [`MemoryStorageFactory`]: in-memory reference backend

mod memory;
mod traits;

pub use memory::{MemoryStorage, MemoryStorageFactory};
pub use traits::{Storage, StorageFactory};
