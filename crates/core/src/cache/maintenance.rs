//! Retention cleanup and storage statistics.
//!
//! Both operations walk the whole year/month/day hierarchy and are meant for
//! operational endpoints, not the hot path.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::store::{FileStore, day_shards, entry_files, subdirs};

/// Result of a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CleanupReport {
    /// Entry files deleted.
    pub removed_files: u64,
    /// Day shards deleted.
    pub removed_dirs: u64,
}

/// Per-category storage totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CategoryStats {
    pub file_count: u64,
    pub size: u64,
}

/// Aggregate storage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StorageStats {
    pub total_size: u64,
    pub file_count: u64,
    pub per_category: BTreeMap<String, CategoryStats>,
}

impl FileStore {
    /// Delete every day shard older than `max_age`.
    pub async fn cleanup(&self, max_age: chrono::Duration) -> CleanupReport {
        self.cleanup_as_of(max_age, Utc::now()).await
    }

    /// Like [`FileStore::cleanup`] with an explicit "now".
    pub async fn cleanup_as_of(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> CleanupReport {
        // a window reaching past the earliest representable date keeps everything
        let cutoff = now.checked_sub_signed(max_age).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut report = CleanupReport::default();

        for shard in day_shards(self.root()).await {
            let Some(midnight) = shard.date.and_hms_opt(0, 0, 0) else {
                continue;
            };
            if midnight.and_utc() >= cutoff {
                continue;
            }

            for (_, category_dir) in subdirs(&shard.path).await {
                for file in entry_files(&category_dir).await {
                    match fs::remove_file(&file).await {
                        Ok(()) => report.removed_files += 1,
                        Err(e) => tracing::error!(path = %file.display(), error = %e, "cleanup error"),
                    }
                }
                remove_if_empty(&category_dir).await;
            }

            if remove_if_empty(&shard.path).await {
                report.removed_dirs += 1;
            }
        }

        prune_empty_parents(self.root()).await;

        tracing::info!(
            removed_files = report.removed_files,
            removed_dirs = report.removed_dirs,
            "cache cleanup completed"
        );
        report
    }

    /// File count and byte size per category.
    pub async fn stats(&self) -> StorageStats {
        let mut stats = StorageStats::default();

        for shard in day_shards(self.root()).await {
            for (category, category_dir) in subdirs(&shard.path).await {
                for file in entry_files(&category_dir).await {
                    let Ok(meta) = fs::metadata(&file).await else {
                        continue;
                    };
                    stats.file_count += 1;
                    stats.total_size += meta.len();

                    let per = stats.per_category.entry(category.clone()).or_default();
                    per.file_count += 1;
                    per.size += meta.len();
                }
            }
        }

        stats
    }
}

async fn remove_if_empty(dir: &Path) -> bool {
    match fs::remove_dir(dir).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "directory not removed");
            false
        }
    }
}

/// Drop month and year directories left empty by a cleanup.
async fn prune_empty_parents(root: &Path) {
    let numeric = |name: &str| !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit());

    for (year_name, year_path) in subdirs(root).await {
        if !numeric(&year_name) {
            continue;
        }
        for (month_name, month_path) in subdirs(&year_path).await {
            if numeric(&month_name) && subdirs(&month_path).await.is_empty() {
                let _ = fs::remove_dir(&month_path).await;
            }
        }
        if subdirs(&year_path).await.is_empty() {
            let _ = fs::remove_dir(&year_path).await;
        }
    }
}
