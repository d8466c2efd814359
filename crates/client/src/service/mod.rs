//! Two-layer cache service.
//!
//! Lookups go memory first, then the date-sharded store, promoting store hits
//! back into memory. Image population is serialized per key so concurrent
//! misses on one URL cost one fetch. Search responses can be cached with
//! their image references rewritten to inline `data:` URIs, fetched in
//! sequential batches that run concurrently inside.

pub mod registry;
pub mod rewrite;
pub mod stats;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use datavault_core::cache::{CleanupReport, KeyLockRegistry, MemoryCache, digest_key};
use datavault_core::{CacheConfig, CacheEntry, Category, Error, FileStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::fetch::image::{is_data_uri, placeholder_data_uri_async};
use crate::fetch::{FetchClient, FetchConfig, FetchError, FetchOutcome};

pub use registry::InstanceRegistry;
pub use stats::{CacheStats, CounterSnapshot, MemoryStats};

use stats::StatsRecorder;

/// Overall budget of the single attempt behind a placeholder.
pub const PLACEHOLDER_TIMEOUT: Duration = Duration::from_secs(2);

/// How [`ImagePreview`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStatus {
    /// The full image was already cached; both fields hold it.
    Cached,
    /// Full-size caching continues in the background.
    Pending,
    /// Nothing will be fetched (shutting down or the host is blocked).
    Unavailable,
}

/// Placeholder plus full-size reference for one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ImagePreview {
    /// Cached data URI, or the original URL while caching is pending.
    pub full: String,
    /// Low-resolution data URI, or the original URL if none could be made.
    pub placeholder: String,
    pub status: PreviewStatus,
}

struct Inner {
    config: CacheConfig,
    store: FileStore,
    memory: Mutex<MemoryCache<Arc<CacheEntry>>>,
    locks: KeyLockRegistry,
    writes: KeyLockRegistry,
    fetcher: FetchClient,
    stats: StatsRecorder,
    tasks: Mutex<JoinSet<()>>,
    shutting_down: AtomicBool,
    started_at: Instant,
}

/// Cheaply cloneable handle to one cache instance.
#[derive(Clone)]
pub struct CacheService {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("base_dir", &self.inner.config.base_dir)
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

fn memory_key(category: Category, digest: &str) -> String {
    format!("{category}/{digest}")
}

impl CacheService {
    /// Build a service over `config.base_dir`. The directory itself is created
    /// lazily by the first write.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration does not validate.
    pub fn new(config: CacheConfig) -> Result<Self, Error> {
        config.validate()?;

        let store = FileStore::new(&config.base_dir, config.lookback_days);
        let memory = MemoryCache::new(config.memory_cache_capacity, config.memory_cache_ttl());
        let fetcher = FetchClient::new(FetchConfig::from(&config));

        tracing::info!(
            base_dir = %config.base_dir.display(),
            memory_capacity = config.memory_cache_capacity,
            fetch_concurrency = config.fetch_concurrency,
            "cache service started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                memory: Mutex::new(memory),
                locks: KeyLockRegistry::new(),
                writes: KeyLockRegistry::new(),
                fetcher,
                stats: StatsRecorder::default(),
                tasks: Mutex::new(JoinSet::new()),
                shutting_down: AtomicBool::new(false),
                started_at: Instant::now(),
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &FileStore {
        &self.inner.store
    }

    pub fn fetcher(&self) -> &FetchClient {
        &self.inner.fetcher
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Cached payload for `key`, if present and younger than `max_age_hours`.
    pub async fn get(&self, key: &str, category: Category) -> Option<Value> {
        match self.lookup(key, category).await {
            Some(entry) => {
                self.inner.stats.hit(category);
                Some(entry.response.clone())
            }
            None => {
                self.inner.stats.miss(category);
                None
            }
        }
    }

    /// Uncounted two-layer lookup.
    async fn lookup(&self, key: &str, category: Category) -> Option<Arc<CacheEntry>> {
        if key.is_empty() {
            return None;
        }

        let digest = digest_key(key);
        let mkey = memory_key(category, &digest);
        let max_age = self.inner.config.max_age();

        {
            let mut memory = self.inner.memory.lock().await;
            if let Some(entry) = memory.get(&mkey) {
                if entry.is_fresh(max_age, Utc::now()) {
                    tracing::debug!(%category, digest, "memory hit");
                    return Some(entry);
                }
                memory.remove(&mkey);
            }
        }

        match self.inner.store.read(category, &digest).await {
            Some(entry) if entry.is_fresh(max_age, Utc::now()) => {
                let entry = Arc::new(entry);
                self.inner.memory.lock().await.put(mkey, entry.clone());
                Some(entry)
            }
            Some(_) => {
                tracing::debug!(%category, digest, "stale entry ignored");
                None
            }
            None => {
                tracing::debug!(%category, digest, "cache miss");
                None
            }
        }
    }

    /// Write-through to memory, then the store.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` for an empty key; `Error::StorageWrite` or
    /// `Error::Serialization` when the store write fails, in which case the
    /// memory layer is restored to what it held before.
    ///
    /// Writers of one key are serialized, so memory and disk always end up
    /// holding the same last value.
    pub async fn set(&self, key: &str, category: Category, value: Value) -> Result<(), Error> {
        if key.is_empty() {
            return Err(Error::InvalidInput("cache key must not be empty".into()));
        }

        let digest = digest_key(key);
        let mkey = memory_key(category, &digest);
        let _write = self.inner.writes.acquire(&mkey).await;
        let entry = Arc::new(CacheEntry::new(key, value));

        let previous = {
            let mut memory = self.inner.memory.lock().await;
            let previous = memory.get(&mkey);
            if let Some(existing) = &previous
                && existing.response == entry.response
                && existing.is_fresh(self.inner.config.max_age(), entry.timestamp)
            {
                tracing::debug!(%category, digest, "unchanged value, store write skipped");
                return Ok(());
            }
            memory.put(mkey.clone(), entry.clone());
            previous
        };

        match self.inner.store.write(category, &digest, &entry).await {
            Ok(_) => {
                self.inner.stats.write(category);
                Ok(())
            }
            Err(e) => {
                tracing::error!(%category, digest, error = %e, "cache write failed");
                self.inner.stats.error(category);

                let mut memory = self.inner.memory.lock().await;
                if memory.get(&mkey).is_some_and(|current| Arc::ptr_eq(&current, &entry)) {
                    match previous {
                        Some(previous) => memory.put(mkey, previous),
                        None => {
                            memory.remove(&mkey);
                        }
                    }
                }
                Err(e)
            }
        }
    }

    /// Remove `key` from both layers. Returns true if anything was removed.
    pub async fn delete(&self, key: &str, category: Category) -> bool {
        let digest = digest_key(key);
        let mkey = memory_key(category, &digest);
        let _write = self.inner.writes.acquire(&mkey).await;
        let in_memory = self.inner.memory.lock().await.remove(&mkey).is_some();
        let on_disk = self.inner.store.delete(category, &digest).await;
        tracing::debug!(%category, digest, in_memory, on_disk, "cache delete");
        in_memory || on_disk
    }

    async fn cached_image(&self, url: &str) -> Option<String> {
        self.lookup(url, Category::Images)
            .await
            .and_then(|entry| entry.response.as_str().map(str::to_string))
    }

    /// Data URI for `url`, fetching and caching it on a miss. Any failure
    /// returns `url` unchanged.
    pub async fn cache_image(&self, url: &str) -> String {
        self.try_cache_image(url).await.unwrap_or_else(|_| url.to_string())
    }

    /// Like [`CacheService::cache_image`], but reports why the image could
    /// not be inlined. A `data:` URI is returned as-is.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` for an empty URL; otherwise the fetch failure
    /// (`InvalidUrl`, `DomainBlocked`, `ShuttingDown`, `FetchTimeout`,
    /// `FetchTooLarge`, `HttpError`).
    pub async fn try_cache_image(&self, url: &str) -> Result<String, Error> {
        if url.trim().is_empty() {
            return Err(Error::InvalidInput("image URL must not be empty".into()));
        }
        if is_data_uri(url) {
            return Ok(url.to_string());
        }

        if let Some(uri) = self.cached_image(url).await {
            self.inner.stats.hit(Category::Images);
            return Ok(uri);
        }

        let digest = digest_key(url);
        let _guard = self.inner.locks.acquire(&memory_key(Category::Images, &digest)).await;

        // populated while we waited
        if let Some(uri) = self.cached_image(url).await {
            self.inner.stats.hit(Category::Images);
            return Ok(uri);
        }
        self.inner.stats.miss(Category::Images);

        match self.inner.fetcher.fetch(url).await {
            FetchOutcome::Fetched(payload) => {
                let uri = payload.to_data_uri();
                if let Err(e) = self.set(url, Category::Images, Value::String(uri.clone())).await {
                    tracing::warn!(url, error = %e, "image fetched but not cached");
                }
                Ok(uri)
            }
            FetchOutcome::Fallback { reason, .. } => {
                if !reason.is_skip() {
                    self.inner.stats.error(Category::Images);
                }
                Err(reason.into())
            }
        }
    }

    /// Placeholder now, full-size image later.
    ///
    /// A cached image is returned as both fields. Otherwise a single quick
    /// attempt produces a thumbnail placeholder while a tracked background
    /// task caches the full image.
    pub async fn image_with_placeholder(&self, url: &str) -> ImagePreview {
        if is_data_uri(url) {
            return ImagePreview { full: url.to_string(), placeholder: url.to_string(), status: PreviewStatus::Cached };
        }
        if let Some(uri) = self.cached_image(url).await {
            self.inner.stats.hit(Category::Images);
            return ImagePreview { full: uri.clone(), placeholder: uri, status: PreviewStatus::Cached };
        }

        let placeholder = match self.inner.fetcher.fetch_once(url, PLACEHOLDER_TIMEOUT).await {
            Ok(payload) => match placeholder_data_uri_async(payload.bytes).await {
                Ok(uri) => uri,
                Err(e) => {
                    tracing::debug!(url, error = %e, "placeholder not generated");
                    url.to_string()
                }
            },
            Err(e) if e.is_skip() || matches!(e, FetchError::InvalidUrl(_)) => {
                return ImagePreview {
                    full: url.to_string(),
                    placeholder: url.to_string(),
                    status: PreviewStatus::Unavailable,
                };
            }
            Err(e) => {
                tracing::debug!(url, error = %e, "placeholder fetch failed");
                url.to_string()
            }
        };

        if !self.spawn_tracked(url).await {
            return ImagePreview { full: url.to_string(), placeholder, status: PreviewStatus::Unavailable };
        }

        ImagePreview { full: url.to_string(), placeholder, status: PreviewStatus::Pending }
    }

    async fn spawn_tracked(&self, url: &str) -> bool {
        let mut tasks = self.inner.tasks.lock().await;
        if self.is_shutting_down() {
            return false;
        }
        while tasks.try_join_next().is_some() {}

        let service = self.clone();
        let url = url.to_string();
        tasks.spawn(async move {
            service.cache_image(&url).await;
        });
        true
    }

    /// Cache `response` under `query`, then inline every image it references.
    ///
    /// Unique URLs are fetched in sequential batches of `fetch_concurrency`.
    /// The response is re-cached after each batch that rewrote something.
    /// References whose fetch failed keep their original URL.
    pub async fn cache_response_and_rewrite_images(&self, query: &str, response: Value) -> Value {
        let mut response = response;
        if let Err(e) = self.set(query, Category::Search, response.clone()).await {
            tracing::warn!(key = query, error = %e, "response not cached");
        }

        let items_field = self.inner.config.items_field.as_str();
        let image_field = self.inner.config.image_field.as_str();
        let urls = rewrite::image_urls(&response, items_field, image_field);
        if urls.is_empty() {
            return response;
        }

        let batch_size = self.inner.config.fetch_concurrency.max(1);
        let mut rewritten = 0;

        for (batch_index, batch) in urls.chunks(batch_size).enumerate() {
            if self.is_shutting_down() {
                tracing::info!(key = query, batch = batch_index, "shutting down, remaining images skipped");
                break;
            }

            let mut set = JoinSet::new();
            for url in batch {
                let service = self.clone();
                let url = url.clone();
                set.spawn(async move {
                    let replacement = service.cache_image(&url).await;
                    (url, replacement)
                });
            }

            let mut replacements = HashMap::with_capacity(batch.len());
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((url, replacement)) => {
                        replacements.insert(url, replacement);
                    }
                    Err(e) => tracing::warn!(key = query, error = %e, "image task failed"),
                }
            }

            let changed = rewrite::apply(&mut response, items_field, image_field, &replacements);
            rewritten += changed;
            tracing::info!(key = query, batch = batch_index, urls = batch.len(), changed, "image batch done");

            if changed > 0
                && let Err(e) = self.set(query, Category::Search, response.clone()).await
            {
                tracing::warn!(key = query, error = %e, "rewritten response not cached");
            }
        }

        tracing::info!(key = query, images = urls.len(), rewritten, "response images rewritten");
        response
    }

    pub async fn stats(&self) -> CacheStats {
        let (totals, per_category) = self.inner.stats.snapshot();
        let memory = {
            let memory = self.inner.memory.lock().await;
            MemoryStats { entries: memory.len(), capacity: memory.capacity(), ttl_seconds: memory.ttl().as_secs() }
        };

        CacheStats {
            totals,
            per_category,
            uptime_seconds: self.inner.started_at.elapsed().as_secs(),
            memory,
            blocked_domains: self.inner.fetcher.breaker().blocked_domains().await.len(),
            storage: self.inner.store.stats().await,
        }
    }

    /// Delete shards older than `cleanup_retention_days`.
    pub async fn cleanup(&self) -> CleanupReport {
        self.cleanup_with(self.inner.config.cleanup_retention()).await
    }

    /// Delete shards older than `days` days.
    pub async fn cleanup_older_than(&self, days: u32) -> CleanupReport {
        self.cleanup_with(chrono::Duration::days(i64::from(days))).await
    }

    async fn cleanup_with(&self, retention: chrono::Duration) -> CleanupReport {
        let report = self.inner.store.cleanup(retention).await;

        // memory must not outlive the shards it mirrors
        let cutoff = Utc::now().checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let dropped = self.inner.memory.lock().await.retain(|entry| {
            entry
                .timestamp
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .is_some_and(|midnight| midnight.and_utc() >= cutoff)
        });
        let swept = self.inner.fetcher.breaker().sweep().await;
        let compacted = self.inner.locks.compact().await + self.inner.writes.compact().await;

        tracing::debug!(dropped, swept, compacted, "in-memory state tidied");
        report
    }

    /// Stop fetching, wait for background caching, release resources.
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(base_dir = %self.inner.config.base_dir.display(), "cache service shutting down");

        self.inner.fetcher.begin_shutdown();

        let mut tasks = std::mem::take(&mut *self.inner.tasks.lock().await);
        let pending = tasks.len();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "background task failed");
            }
        }

        self.inner.fetcher.close().await;
        self.inner.locks.clear().await;
        self.inner.writes.clear().await;
        tracing::info!(pending, "cache service stopped");
    }
}
