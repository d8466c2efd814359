//! cache_delete tool implementation.

use datavault_client::CacheService;
use datavault_core::Category;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the cache_delete tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheDeleteParams {
    pub key: String,

    /// Cache partition (default: search).
    #[serde(default)]
    pub category: Option<Category>,
}

/// Output from the cache_delete tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheDeleteOutput {
    /// Whether anything was removed.
    pub deleted: bool,
}

/// Implementation of the cache_delete tool.
pub async fn delete_impl(cache: &CacheService, params: CacheDeleteParams) -> Result<CallToolResult, McpError> {
    let deleted = cache
        .delete(&params.key, params.category.unwrap_or(Category::Search))
        .await;
    json_result(&CacheDeleteOutput { deleted })
}
