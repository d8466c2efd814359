//! Hit/miss counters and the stats snapshot returned by the service.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use datavault_core::Category;
use datavault_core::cache::StorageStats;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    writes: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CounterSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CounterSnapshot {
            hits,
            misses,
            errors: self.errors.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            hit_ratio: hit_ratio(hits, misses),
        }
    }
}

fn hit_ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 { 0.0 } else { hits as f64 / total as f64 }
}

/// Lock-free counters, one set per category.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    search: Counters,
    images: Counters,
}

impl StatsRecorder {
    fn counters(&self, category: Category) -> &Counters {
        match category {
            Category::Search => &self.search,
            Category::Images => &self.images,
        }
    }

    pub(crate) fn hit(&self, category: Category) {
        self.counters(category).hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self, category: Category) {
        self.counters(category).misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn error(&self, category: Category) {
        self.counters(category).errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn write(&self, category: Category) {
        self.counters(category).writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> (CounterSnapshot, BTreeMap<String, CounterSnapshot>) {
        let mut per_category = BTreeMap::new();
        let mut total = CounterSnapshot::default();
        for category in Category::ALL {
            let snap = self.counters(category).snapshot();
            total.hits += snap.hits;
            total.misses += snap.misses;
            total.errors += snap.errors;
            total.writes += snap.writes;
            per_category.insert(category.to_string(), snap);
        }
        total.hit_ratio = hit_ratio(total.hits, total.misses);
        (total, per_category)
    }
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CounterSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub writes: u64,
    /// hits / (hits + misses), 0 when nothing was looked up yet
    pub hit_ratio: f64,
}

/// Memory layer occupancy and limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct MemoryStats {
    pub entries: usize,
    pub capacity: usize,
    pub ttl_seconds: u64,
}

/// Everything `stats()` reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheStats {
    #[serde(flatten)]
    pub totals: CounterSnapshot,
    pub per_category: BTreeMap<String, CounterSnapshot>,
    pub uptime_seconds: u64,
    pub memory: MemoryStats,
    pub blocked_domains: usize,
    pub storage: StorageStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        assert_eq!(hit_ratio(0, 0), 0.0);
        assert_eq!(hit_ratio(3, 1), 0.75);
    }

    #[test]
    fn test_snapshot_sums_categories() {
        let stats = StatsRecorder::default();
        stats.hit(Category::Search);
        stats.hit(Category::Images);
        stats.miss(Category::Images);
        stats.write(Category::Search);
        stats.error(Category::Images);

        let (total, per_category) = stats.snapshot();
        assert_eq!(total.hits, 2);
        assert_eq!(total.misses, 1);
        assert_eq!(total.writes, 1);
        assert_eq!(total.errors, 1);
        assert!((total.hit_ratio - 2.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(per_category["images"].hit_ratio, 0.5);
        assert_eq!(per_category["search"].hit_ratio, 1.0);
    }
}
