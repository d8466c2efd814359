//! cache_get tool implementation.
//!
//! Retrieves a cached value by key.

use datavault_client::CacheService;
use datavault_core::{Category, Error};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// The key the value was stored under (a query or an image URL).
    pub key: String,

    /// Cache partition (default: search).
    #[serde(default)]
    pub category: Option<Category>,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub key: String,
    pub category: Category,
    /// The cached value.
    pub value: serde_json::Value,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(cache: &CacheService, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let category = params.category.unwrap_or(Category::Search);
    let value = cache
        .get(&params.key, category)
        .await
        .ok_or_else(|| Error::CacheMiss(params.key.clone()))?;

    json_result(&CacheGetOutput { key: params.key, category, value })
}
