//! cache_cleanup tool implementation.
//!
//! Deletes date shards past the retention period.

use datavault_client::CacheService;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the cache_cleanup tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheCleanupParams {
    /// Delete shards older than this many days (default: configured retention).
    #[serde(default)]
    pub older_than_days: Option<u32>,
}

/// Implementation of the cache_cleanup tool.
pub async fn cleanup_impl(cache: &CacheService, params: CacheCleanupParams) -> Result<CallToolResult, McpError> {
    let report = match params.older_than_days {
        Some(days) => cache.cleanup_older_than(days).await,
        None => cache.cleanup().await,
    };
    json_result(&report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::cache::test_support::{output, service};
    use datavault_core::cache::{CacheEntry, CleanupReport, digest_key};
    use datavault_core::Category;

    #[tokio::test]
    async fn test_cleanup_impl_uses_retention() {
        let dir = tempfile::tempdir().unwrap();
        let cache = service(dir.path());
        let old = CacheEntry {
            timestamp: chrono::Utc::now() - chrono::Duration::days(10),
            ..CacheEntry::new("old", serde_json::json!(1))
        };
        cache.store().write(Category::Search, &digest_key("old"), &old).await.unwrap();
        cache.set("new", Category::Search, serde_json::json!(2)).await.unwrap();

        let report: CleanupReport = output(&cleanup_impl(&cache, CacheCleanupParams::default()).await.unwrap());
        assert_eq!(report.removed_files, 1);
        assert_eq!(cache.get("new", Category::Search).await, Some(serde_json::json!(2)));
    }
}
