//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use crate::tools::cache::{
    CacheCleanupParams, CacheDeleteParams, CacheGetParams, CacheImageParams, CacheResponseParams, CacheSetParams,
    cleanup_impl, delete_impl, get_impl, image_impl, response_impl, set_impl, stats_impl,
};

use datavault_client::CacheService;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for datavault.
#[derive(Clone)]
pub struct DatavaultServer {
    cache: CacheService,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl DatavaultServer {
    /// Create a new server handler over `cache`.
    pub fn new(cache: CacheService) -> Self {
        Self { cache, tool_router: Self::tool_router() }
    }

    #[tool(description = "Look up a cached value by key and category (search or images).")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.cache, params.0).await
    }

    #[tool(description = "Store a JSON value under a key and category.")]
    async fn cache_set(&self, params: Parameters<CacheSetParams>) -> Result<CallToolResult, McpError> {
        set_impl(&self.cache, params.0).await
    }

    #[tool(description = "Remove a key from memory and disk.")]
    async fn cache_delete(&self, params: Parameters<CacheDeleteParams>) -> Result<CallToolResult, McpError> {
        delete_impl(&self.cache, params.0).await
    }

    /// Cache a search response and inline its images.
    ///
    /// Image references that cannot be fetched keep their original URL.
    #[tool(
        description = "Cache a search response and rewrite its image URLs to inline data URIs. Returns the rewritten response."
    )]
    async fn cache_response(&self, params: Parameters<CacheResponseParams>) -> Result<CallToolResult, McpError> {
        response_impl(&self.cache, params.0).await
    }

    #[tool(
        description = "Fetch and cache one image as a data URI. With placeholder=true, returns a low-resolution preview immediately and caches the full image in the background."
    )]
    async fn cache_image(&self, params: Parameters<CacheImageParams>) -> Result<CallToolResult, McpError> {
        image_impl(&self.cache, params.0).await
    }

    #[tool(description = "Hit/miss counters, memory usage, blocked domains and on-disk totals.")]
    async fn cache_stats(&self) -> Result<CallToolResult, McpError> {
        stats_impl(&self.cache).await
    }

    #[tool(description = "Delete date shards older than the retention period (or older_than_days).")]
    async fn cache_cleanup(&self, params: Parameters<CacheCleanupParams>) -> Result<CallToolResult, McpError> {
        cleanup_impl(&self.cache, params.0).await
    }
}

impl ServerHandler for DatavaultServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "datavault-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
