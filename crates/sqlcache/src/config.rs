//! Cache configuration options

use crate::resolver::ResolutionPolicy;
use serde::{Deserialize, Serialize};
use sqlcache_core::{CacheError, Result};
use sqlcache_source::DEFAULT_BATCH_SIZE;
use sqlcache_store::StoreConfig;
use std::path::Path;

/// Configuration for the query-result cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Rows per record batch when materializing source results
    pub batch_size: usize,
    /// How a query's target table is determined
    pub resolution: ResolutionPolicy,
    /// Settings for the embedded analytical store
    pub store: StoreConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            resolution: ResolutionPolicy::default(),
            store: StoreConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Load a configuration from a JSON file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CacheError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: CacheConfig =
            serde_json::from_str(json).map_err(|e| CacheError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(self).map_err(|e| CacheError::Config(e.to_string()))?;
        std::fs::write(path, contents).map_err(|e| CacheError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(CacheError::Config("batch_size must be positive".to_string()));
        }
        if self.store.target_partitions == 0 {
            return Err(CacheError::Config(
                "store.target_partitions must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the rows per materialized batch
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_resolution(mut self, resolution: ResolutionPolicy) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }
}
