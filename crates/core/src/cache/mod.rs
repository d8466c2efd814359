//! Two-layer cache primitives.
//!
//! This module provides the storage side of the cache:
//!
//! - Content digests (SHA-256) for keys
//! - Date-sharded JSON file store with atomic writes
//! - Retention cleanup and storage statistics
//! - Bounded, TTL-expiring memory cache
//! - Per-key population locks (stampede prevention)

pub mod entry;
pub mod hash;
pub mod locks;
pub mod maintenance;
pub mod memory;
pub mod store;

pub use crate::Error;

pub use entry::{CacheEntry, Category};
pub use hash::digest_key;
pub use locks::{KeyLockGuard, KeyLockRegistry};
pub use maintenance::{CategoryStats, CleanupReport, StorageStats};
pub use memory::MemoryCache;
pub use store::FileStore;
