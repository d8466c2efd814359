//! cache_stats tool implementation.

use datavault_client::CacheService;
use rmcp::{ErrorData as McpError, model::CallToolResult};

use super::json_result;

/// Implementation of the cache_stats tool.
pub async fn stats_impl(cache: &CacheService) -> Result<CallToolResult, McpError> {
    json_result(&cache.stats().await)
}
