//! Network side of datavault.
//!
//! This crate provides the image fetch pipeline (retries, circuit breaker,
//! inline re-encoding) and the cache service that ties it to the storage
//! primitives in `datavault-core`.

pub mod fetch;
pub mod service;

pub use fetch::{DomainCircuitBreaker, FetchClient, FetchConfig, FetchError, FetchOutcome, FetchedPayload};
pub use service::{CacheService, CacheStats, ImagePreview, InstanceRegistry, PreviewStatus};
