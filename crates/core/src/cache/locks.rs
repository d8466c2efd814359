//! Per-key population locks.
//!
//! Concurrent callers that miss the same key serialize on one lock, so only
//! the first performs the expensive populate and the rest observe its result.
//! The registry keeps weak references: a lock disappears once its last guard
//! and waiter are gone, and dead slots are compacted as the map grows.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Dead slots are swept once the map reaches this many keys.
const COMPACT_THRESHOLD: usize = 256;

/// Scoped hold on a key's lock. Dropping it releases the key.
#[derive(Debug)]
pub struct KeyLockGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyLockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Hands out one async mutex per key.
#[derive(Debug, Default)]
pub struct KeyLockRegistry {
    locks: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl KeyLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: &str) -> KeyLockGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() >= COMPACT_THRESHOLD {
                locks.retain(|_, weak| weak.strong_count() > 0);
            }

            match locks.get(key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(Mutex::new(()));
                    locks.insert(key.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };

        KeyLockGuard { key: key.to_string(), _guard: lock.lock_owned().await }
    }

    /// Drop slots whose lock is no longer held or awaited.
    pub async fn compact(&self) -> usize {
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|_, weak| weak.strong_count() > 0);
        before - locks.len()
    }

    /// Number of tracked keys, dead slots included.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.locks.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_single_populate_under_contention() {
        let registry = Arc::new(KeyLockRegistry::new());
        let cache: Arc<Mutex<Option<u32>>> = Arc::new(Mutex::new(None));
        let populates = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let registry = registry.clone();
            let cache = cache.clone();
            let populates = populates.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire("hot-key").await;
                if let Some(v) = *cache.lock().await {
                    return v;
                }
                populates.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                *cache.lock().await = Some(42);
                42
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(populates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let registry = KeyLockRegistry::new();
        let a = registry.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), registry.acquire("b")).await;
        assert!(b.is_ok());
        assert_eq!(a.key(), "a");
    }

    #[tokio::test]
    async fn test_same_key_waits_for_release() {
        let registry = Arc::new(KeyLockRegistry::new());
        let guard = registry.acquire("k").await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), registry.acquire("k")).await;
        assert!(blocked.is_err());

        drop(guard);
        let reacquired = tokio::time::timeout(Duration::from_millis(100), registry.acquire("k")).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn test_released_locks_are_compacted() {
        let registry = KeyLockRegistry::new();
        for i in 0..10 {
            let _guard = registry.acquire(&format!("k{i}")).await;
        }
        let held = registry.acquire("held").await;

        assert_eq!(registry.len().await, 11);
        assert_eq!(registry.compact().await, 10);
        assert_eq!(registry.len().await, 1);
        drop(held);
    }

    #[tokio::test]
    async fn test_map_bounded_by_threshold() {
        let registry = KeyLockRegistry::new();
        for i in 0..(COMPACT_THRESHOLD * 3) {
            let _guard = registry.acquire(&format!("k{i}")).await;
        }
        assert!(registry.len().await <= COMPACT_THRESHOLD);
    }
}
