//! cache_set tool implementation.

use datavault_client::CacheService;
use datavault_core::Category;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the cache_set tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSetParams {
    pub key: String,

    /// Cache partition (default: search).
    #[serde(default)]
    pub category: Option<Category>,

    /// Any JSON value.
    pub value: serde_json::Value,
}

/// Output from the cache_set tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSetOutput {
    pub key: String,
    pub category: Category,
    pub stored: bool,
}

/// Implementation of the cache_set tool.
pub async fn set_impl(cache: &CacheService, params: CacheSetParams) -> Result<CallToolResult, McpError> {
    let category = params.category.unwrap_or(Category::Search);
    cache.set(&params.key, category, params.value).await?;
    json_result(&CacheSetOutput { key: params.key, category, stored: true })
}
