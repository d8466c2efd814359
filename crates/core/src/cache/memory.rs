//! Bounded, time-expiring in-memory cache.
//!
//! Eviction runs in two phases on overflow: everything past its TTL goes
//! first, then the oldest insertions until the cache fits its capacity.
//! The map is not synchronized; owners wrap it in a lock.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Record<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> Record<V> {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) > ttl
    }
}

/// Fixed-capacity map with per-record TTL.
#[derive(Debug)]
pub struct MemoryCache<V> {
    records: HashMap<String, Record<V>>,
    capacity: usize,
    ttl: Duration,
}

impl<V: Clone> MemoryCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self { records: HashMap::with_capacity(capacity.min(1024)), capacity: capacity.max(1), ttl }
    }

    /// Return the value for `digest` if present and not expired. An expired
    /// record is dropped on observation.
    pub fn get(&mut self, digest: &str) -> Option<V> {
        let now = Instant::now();
        match self.records.get(digest) {
            Some(record) if record.is_expired(self.ttl, now) => {
                self.records.remove(digest);
                None
            }
            Some(record) => Some(record.value.clone()),
            None => None,
        }
    }

    /// Insert or replace `digest`, then evict down to capacity.
    pub fn put(&mut self, digest: impl Into<String>, value: V) {
        self.records.insert(digest.into(), Record { value, inserted_at: Instant::now() });
        if self.records.len() > self.capacity {
            self.evict();
        }
    }

    pub fn remove(&mut self, digest: &str) -> Option<V> {
        self.records.remove(digest).map(|r| r.value)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Keep only values for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&V) -> bool) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| keep(&record.value));
        before - self.records.len()
    }

    /// Drop expired records, then the oldest insertions while over capacity.
    /// Returns the number of records removed.
    pub fn evict(&mut self) -> usize {
        let before = self.records.len();
        let now = Instant::now();
        let ttl = self.ttl;
        self.records.retain(|_, record| !record.is_expired(ttl, now));

        if self.records.len() > self.capacity {
            let mut by_age: Vec<(Instant, String)> =
                self.records.iter().map(|(k, r)| (r.inserted_at, k.clone())).collect();
            by_age.sort();

            let excess = self.records.len() - self.capacity;
            for (_, key) in by_age.into_iter().take(excess) {
                self.records.remove(&key);
            }
        }

        before - self.records.len()
    }
}
