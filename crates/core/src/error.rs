//! Unified error types for datavault.
//!
//! Every message starts with a stable code so callers (and the MCP surface)
//! can match on the failure class without parsing prose.

use std::path::PathBuf;

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Unified error types for the datavault cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty key).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Unknown cache category name.
    #[error("INVALID_CATEGORY: {0}")]
    InvalidCategory(String),

    /// No cache entry found for the given key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Disk read failed. The cache degrades reads to misses; embedders
    /// reading entries directly may still surface it.
    #[error("STORAGE_READ: {path}: {source}")]
    StorageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Disk write failed (disk full, permissions, ...).
    #[error("STORAGE_WRITE: {path}: {source}")]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration rejected at construction time.
    #[error("INVALID_CONFIG: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Entry could not be encoded as JSON.
    #[error("SERIALIZATION: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// HTTP error response.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// The host is currently blocked by the circuit breaker.
    #[error("DOMAIN_BLOCKED: {0}")]
    DomainBlocked(String),

    /// The cache service is shutting down.
    #[error("SHUTTING_DOWN")]
    ShuttingDown,

    /// Image decoding or thumbnail encoding failed.
    #[error("IMAGE_ENCODE: {0}")]
    ImageEncode(String),
}

impl Error {
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::StorageWrite { path: path.into(), source }
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidCategory(msg) => (-32602, format!("unknown category: {msg}")),
            Error::Config(e) => (-32602, e.to_string()),
            Error::CacheMiss(msg) => (-32001, msg.clone()),
            Error::StorageRead { .. } | Error::StorageWrite { .. } => (-32002, err.to_string()),
            Error::Serialization(e) => (-32002, e.to_string()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::FetchTimeout(msg) => (-32006, msg.clone()),
            Error::FetchTooLarge(msg) => (-32007, msg.clone()),
            Error::HttpError(msg) => (-32008, msg.clone()),
            Error::DomainBlocked(msg) => (-32009, msg.clone()),
            Error::ShuttingDown => (-32010, "Cache service is shutting down".to_string()),
            Error::ImageEncode(msg) => (-32011, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
