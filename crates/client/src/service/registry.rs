//! One [`CacheService`] per storage root.
//!
//! Built once at startup and handed to whoever needs a cache. Two configs
//! naming the same directory (through different spellings or symlinks) share
//! one instance.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use datavault_core::{CacheConfig, Error};
use tokio::sync::Mutex;

use super::CacheService;

#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: Mutex<HashMap<PathBuf, CacheService>>,
}

async fn canonical_root(base_dir: &Path) -> Result<PathBuf, Error> {
    tokio::fs::create_dir_all(base_dir).await.map_err(|e| Error::write(base_dir, e))?;
    tokio::fs::canonicalize(base_dir).await.map_err(|e| Error::StorageRead { path: base_dir.to_path_buf(), source: e })
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The service for `config.base_dir`, creating it on first use.
    ///
    /// Later calls for the same root return the existing instance and ignore
    /// the rest of `config`. An instance that was shut down outside the
    /// registry is replaced by a fresh one.
    ///
    /// # Errors
    ///
    /// `Error::StorageWrite` if the root cannot be created, `Error::Config`
    /// if a new instance's config does not validate.
    pub async fn get_or_create(&self, config: &CacheConfig) -> Result<CacheService, Error> {
        let mut instances = self.instances.lock().await;
        let root = canonical_root(&config.base_dir).await?;

        if let Some(service) = instances.get(&root) {
            if !service.is_shutting_down() {
                return Ok(service.clone());
            }
            tracing::info!(root = %root.display(), "replacing shut down cache instance");
        }

        let service = CacheService::new(CacheConfig { base_dir: root.clone(), ..config.clone() })?;
        instances.insert(root.clone(), service.clone());
        tracing::info!(root = %root.display(), instances = instances.len(), "cache instance registered");
        Ok(service)
    }

    /// Forget the instance for `config.base_dir` without shutting it down.
    pub async fn remove(&self, config: &CacheConfig) -> Option<CacheService> {
        let root = tokio::fs::canonicalize(&config.base_dir).await.ok()?;
        self.instances.lock().await.remove(&root)
    }

    /// Remove and shut down the instance for `config.base_dir`.
    pub async fn shutdown(&self, config: &CacheConfig) -> bool {
        match self.remove(config).await {
            Some(service) => {
                service.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Remove and shut down every instance.
    pub async fn shutdown_all(&self) {
        let drained: Vec<CacheService> = self.instances.lock().await.drain().map(|(_, s)| s).collect();
        for service in drained {
            service.shutdown().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.instances.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
