//! cache_response tool implementation.
//!
//! Caches a search response and rewrites its image references to data URIs.

use datavault_client::CacheService;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the cache_response tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheResponseParams {
    /// The query the response answers; used as the cache key.
    pub query: String,

    /// The search response. Images are read from `articles[*].urlToImage`
    /// unless configured otherwise.
    pub response: serde_json::Value,
}

/// Output from the cache_response tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheResponseOutput {
    pub query: String,
    /// The response with every fetchable image inlined.
    pub response: serde_json::Value,
}

/// Implementation of the cache_response tool.
pub async fn response_impl(cache: &CacheService, params: CacheResponseParams) -> Result<CallToolResult, McpError> {
    let response = cache
        .cache_response_and_rewrite_images(&params.query, params.response)
        .await;
    json_result(&CacheResponseOutput { query: params.query, response })
}
