//! Date-sharded file store.
//!
//! Entries live at `<root>/<year>/<month>/<day>/<category>/<digest>.json`,
//! sharded by the UTC date they were written. Writes go to a temporary
//! sibling and are renamed into place, so readers only ever see complete
//! files. Reads treat every failure as a miss.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Datelike, NaiveDate, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::entry::{CacheEntry, Category};
use crate::Error;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A day directory found while walking the store.
#[derive(Debug, Clone)]
pub(crate) struct DayShard {
    pub path: PathBuf,
    pub date: NaiveDate,
}

/// File-system persistence for cache entries.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    lookback_days: u32,
}

impl FileStore {
    /// Create a store rooted at `root` that probes `lookback_days` date shards
    /// (today included) on every read.
    pub fn new(root: impl Into<PathBuf>, lookback_days: u32) -> Self {
        Self { root: root.into(), lookback_days: lookback_days.max(1) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one category's entries for one day.
    pub fn shard_dir(&self, date: NaiveDate, category: Category) -> PathBuf {
        self.root
            .join(date.year().to_string())
            .join(date.month().to_string())
            .join(date.day().to_string())
            .join(category.as_str())
    }

    pub fn entry_path(&self, date: NaiveDate, category: Category, digest: &str) -> PathBuf {
        self.shard_dir(date, category).join(format!("{digest}.json"))
    }

    /// Read the newest entry for `digest`, probing today's shard first.
    pub async fn read(&self, category: Category, digest: &str) -> Option<CacheEntry> {
        self.read_as_of(category, digest, Utc::now().date_naive()).await
    }

    /// Like [`FileStore::read`] with an explicit "today".
    pub async fn read_as_of(&self, category: Category, digest: &str, today: NaiveDate) -> Option<CacheEntry> {
        for days_ago in 0..self.lookback_days {
            let Some(date) = today.checked_sub_days(chrono::Days::new(days_ago as u64)) else {
                break;
            };
            let path = self.entry_path(date, category, digest);

            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cache read error");
                    continue;
                }
            };

            match serde_json::from_slice::<CacheEntry>(&bytes) {
                Ok(entry) => {
                    tracing::debug!(%category, digest, days_ago, "store hit");
                    return Some(entry);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "corrupt cache entry ignored");
                }
            }
        }

        None
    }

    /// Persist `entry` under the shard of its timestamp's date.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageWrite` if a directory, the temporary file or the
    /// final rename cannot be written, and `Error::Serialization` if the
    /// payload cannot be encoded.
    pub async fn write(&self, category: Category, digest: &str, entry: &CacheEntry) -> Result<PathBuf, Error> {
        let dir = self.shard_dir(entry.timestamp.date_naive(), category);
        let path = dir.join(format!("{digest}.json"));
        let body = serde_json::to_vec(entry)?;

        fs::create_dir_all(&dir).await.map_err(|e| Error::write(&dir, e))?;

        let tmp = dir.join(format!(
            "{digest}.json.{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = write_synced(&tmp, &body).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(Error::write(&tmp, e));
        }

        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(Error::write(&path, e));
        }

        tracing::debug!(%category, digest, path = %path.display(), "store write");
        Ok(path)
    }

    /// Remove `digest` from every date shard. Returns true if anything was removed.
    pub async fn delete(&self, category: Category, digest: &str) -> bool {
        let mut removed = false;
        for shard in day_shards(&self.root).await {
            let path = shard.path.join(category.as_str()).join(format!("{digest}.json"));
            match fs::remove_file(&path).await {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::error!(path = %path.display(), error = %e, "cache delete error"),
            }
        }
        removed
    }

    /// Every entry file of `category` across all date shards.
    pub async fn list_entries(&self, category: Category) -> Vec<PathBuf> {
        let mut entries = Vec::new();
        for shard in day_shards(&self.root).await {
            entries.extend(entry_files(&shard.path.join(category.as_str())).await);
        }
        entries.sort();
        entries
    }
}

async fn write_synced(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(body).await?;
    file.sync_all().await
}

/// Subdirectories of `dir` as `(name, path)`. A missing or unreadable
/// directory yields nothing.
pub(crate) async fn subdirs(dir: &Path) -> Vec<(String, PathBuf)> {
    let mut out = Vec::new();
    let Ok(mut rd) = fs::read_dir(dir).await else {
        return out;
    };
    while let Ok(Some(item)) = rd.next_entry().await {
        let is_dir = item.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            out.push((item.file_name().to_string_lossy().into_owned(), item.path()));
        }
    }
    out
}

/// `*.json` files directly inside `dir`.
pub(crate) async fn entry_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(mut rd) = fs::read_dir(dir).await else {
        return out;
    };
    while let Ok(Some(item)) = rd.next_entry().await {
        let path = item.path();
        let is_file = item.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    out
}

/// All well-formed `year/month/day` directories under `root`. Malformed names
/// are logged and skipped.
pub(crate) async fn day_shards(root: &Path) -> Vec<DayShard> {
    let mut shards = Vec::new();
    for (year_name, year_path) in subdirs(root).await {
        let Ok(year) = year_name.parse::<i32>() else {
            tracing::warn!(dir = %year_path.display(), "skipping malformed year directory");
            continue;
        };
        for (month_name, month_path) in subdirs(&year_path).await {
            let Ok(month) = month_name.parse::<u32>() else {
                tracing::warn!(dir = %month_path.display(), "skipping malformed month directory");
                continue;
            };
            for (day_name, day_path) in subdirs(&month_path).await {
                let date = day_name
                    .parse::<u32>()
                    .ok()
                    .and_then(|day| NaiveDate::from_ymd_opt(year, month, day));
                match date {
                    Some(date) => shards.push(DayShard { path: day_path, date }),
                    None => tracing::warn!(dir = %day_path.display(), "skipping malformed day directory"),
                }
            }
        }
    }
    shards.sort_by(|a, b| b.date.cmp(&a.date));
    shards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::hash::digest_key;
    use serde_json::json;

    fn entry_days_ago(query: &str, days: i64) -> CacheEntry {
        CacheEntry {
            timestamp: Utc::now() - chrono::Duration::days(days),
            ..CacheEntry::new(query, json!({"q": query, "days": days}))
        }
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 7);
        let digest = digest_key("rust");
        let entry = CacheEntry::new("rust", json!({"articles": [1, 2]}));

        let path = store.write(Category::Search, &digest, &entry).await.unwrap();
        assert!(path.ends_with(format!("search/{digest}.json")));

        let read = store.read(Category::Search, &digest).await.unwrap();
        assert_eq!(read, entry);
        assert!(store.read(Category::Images, &digest).await.is_none());
    }

    #[tokio::test]
    async fn test_layout_uses_unpadded_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 7);
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(
            store.entry_path(date, Category::Images, "abc"),
            dir.path().join("2024/3/5/images/abc.json")
        );
    }

    #[tokio::test]
    async fn test_read_missing_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 7);
        assert!(store.read(Category::Search, &digest_key("nope")).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 7);
        let digest = digest_key("broken");
        let path = store.entry_path(Utc::now().date_naive(), Category::Search, &digest);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{\"query\": \"broken\", \"timest").unwrap();

        assert!(store.read(Category::Search, &digest).await.is_none());
    }

    #[tokio::test]
    async fn test_read_probes_previous_days_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 7);
        let digest = digest_key("rust");

        store.write(Category::Search, &digest, &entry_days_ago("rust", 5)).await.unwrap();
        store.write(Category::Search, &digest, &entry_days_ago("rust", 2)).await.unwrap();

        let read = store.read(Category::Search, &digest).await.unwrap();
        assert_eq!(read.response["days"], 2);
    }

    #[tokio::test]
    async fn test_read_stops_at_lookback_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 3);
        let digest = digest_key("old");

        store.write(Category::Search, &digest, &entry_days_ago("old", 3)).await.unwrap();
        assert!(store.read(Category::Search, &digest).await.is_none());

        let wide = FileStore::new(dir.path(), 4);
        assert!(wide.read(Category::Search, &digest).await.is_some());
    }

    #[tokio::test]
    async fn test_write_replaces_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 7);
        let digest = digest_key("rust");

        store.write(Category::Search, &digest, &CacheEntry::new("rust", json!(1))).await.unwrap();
        let path = store.write(Category::Search, &digest, &CacheEntry::new("rust", json!(2))).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{digest}.json")]);
        assert_eq!(store.read(Category::Search, &digest).await.unwrap().response, json!(2));
    }

    #[tokio::test]
    async fn test_write_error_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let store = FileStore::new(&blocker, 7);

        let result = store
            .write(Category::Search, &digest_key("x"), &CacheEntry::new("x", json!(null)))
            .await;
        assert!(matches!(result, Err(Error::StorageWrite { .. })));
    }

    #[tokio::test]
    async fn test_delete_across_shards() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 7);
        let digest = digest_key("gone");

        store.write(Category::Images, &digest, &entry_days_ago("gone", 0)).await.unwrap();
        store.write(Category::Images, &digest, &entry_days_ago("gone", 1)).await.unwrap();

        assert!(store.delete(Category::Images, &digest).await);
        assert!(store.read(Category::Images, &digest).await.is_none());
        assert!(!store.delete(Category::Images, &digest).await);
    }

    #[tokio::test]
    async fn test_list_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 7);

        store.write(Category::Search, &digest_key("a"), &entry_days_ago("a", 0)).await.unwrap();
        store.write(Category::Search, &digest_key("b"), &entry_days_ago("b", 10)).await.unwrap();
        store.write(Category::Images, &digest_key("c"), &entry_days_ago("c", 0)).await.unwrap();

        assert_eq!(store.list_entries(Category::Search).await.len(), 2);
        assert_eq!(store.list_entries(Category::Images).await.len(), 1);
    }

    #[tokio::test]
    async fn test_day_shards_skip_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("2024/1/15/search")).unwrap();
        std::fs::create_dir_all(dir.path().join("2024/2/30/search")).unwrap();
        std::fs::create_dir_all(dir.path().join("2024/jan/1")).unwrap();
        std::fs::create_dir_all(dir.path().join("tmp/1/1")).unwrap();

        let shards = day_shards(dir.path()).await;
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }
}
