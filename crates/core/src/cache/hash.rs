//! Content digests for cache keys.

use sha2::{Digest, Sha256};

/// Compute the storage-safe digest of a cache key.
///
/// Keys are never used as paths; the digest is the file stem on disk and the
/// memory-cache key.
pub fn digest_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
