//! Core types and shared functionality for datavault.
//!
//! This crate provides:
//! - Date-sharded file store, memory cache and key locks
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheEntry, Category, FileStore};
pub use config::{CacheConfig, ConfigError};
pub use error::Error;
