//! Cache-related MCP tools.
//!
//! Every tool answers with one pretty-printed JSON text block.

pub mod cleanup;
pub mod delete;
pub mod get;
pub mod image;
pub mod response;
pub mod set;
pub mod stats;

pub use cleanup::{CacheCleanupParams, cleanup_impl};
pub use delete::{CacheDeleteParams, delete_impl};
pub use get::{CacheGetParams, get_impl};
pub use image::{CacheImageParams, image_impl};
pub use response::{CacheResponseParams, response_impl};
pub use set::{CacheSetParams, set_impl};
pub use stats::stats_impl;

use datavault_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
