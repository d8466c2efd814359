//! Cache categories and the on-disk entry format.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Partition of the cache. Each category gets its own directory inside a
/// date shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Search API responses.
    Search,
    /// Image payloads re-encoded as data URIs.
    Images,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Search, Category::Images];

    /// Directory name inside a date shard.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Search => "search",
            Category::Images => "images",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(Category::Search),
            "images" | "image" => Ok(Category::Images),
            other => Err(Error::InvalidCategory(other.to_string())),
        }
    }
}

/// A persisted cache entry.
///
/// Serialized as `{ "query": ..., "timestamp": ..., "response": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The original, unhashed key.
    pub query: String,
    /// Write time; also selects the date shard.
    pub timestamp: DateTime<Utc>,
    /// The cached payload.
    pub response: serde_json::Value,
}

impl CacheEntry {
    pub fn new(query: impl Into<String>, response: serde_json::Value) -> Self {
        Self { query: query.into(), timestamp: Utc::now(), response }
    }

    /// Whether the entry is younger than `max_age` at `now`.
    pub fn is_fresh(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.timestamp) < max_age
    }
}
