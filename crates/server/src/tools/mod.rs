//! MCP tool implementations.
//!
//! This module contains all tools exposed by the datavault-mcp server.

pub mod cache;
