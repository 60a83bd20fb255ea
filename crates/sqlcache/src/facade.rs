//! The query-result cache

use crate::config::CacheConfig;
use crate::directory::CacheDirectory;
use crate::resolver::resolve_table_with;
use crate::stats::CacheStats;
use sqlcache_core::{CacheError, MaterializedTable, Result, SelectQuery};
use sqlcache_source::{convert_with_batch_size, SourceSession};
use sqlcache_store::{AnalyticalStore, ReadSession};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Materializes source query results as named tables and serves them back.
///
/// Each instance owns its analytical store and directory; share it through
/// an `Arc` when several tasks need the same cache.
pub struct SqlCache {
    store: AnalyticalStore,
    directory: CacheDirectory,
    stats: Arc<CacheStats>,
    config: CacheConfig,
}

impl SqlCache {
    pub fn new(config: CacheConfig) -> Self {
        info!(
            "Creating SQL result cache (resolution: {:?}, batch size: {})",
            config.resolution, config.batch_size
        );
        Self {
            store: AnalyticalStore::new(config.store.clone()),
            directory: CacheDirectory::new(),
            stats: Arc::new(CacheStats::new()),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Build a cache on a prepared store, e.g. one whose engine already holds
    /// tables the cache must not overwrite. The store must not hold any
    /// cache-owned table yet.
    pub fn with_store(config: CacheConfig, store: AnalyticalStore) -> Result<Self> {
        let owned = store.table_names();
        if !owned.is_empty() {
            return Err(CacheError::Config(format!(
                "store already holds cached tables: {}",
                owned.join(", ")
            )));
        }
        Ok(Self {
            store,
            directory: CacheDirectory::new(),
            stats: Arc::new(CacheStats::new()),
            config,
        })
    }

    /// Run `query` on the source, cache the result under its table name and
    /// return it.
    ///
    /// The name is resolved before the source is touched. The result is
    /// published only after the whole result set has been materialized, so
    /// a failed or cancelled call leaves both the store and the directory as
    /// they were.
    pub async fn query_db<S>(&self, query: &SelectQuery, session: &S) -> Result<MaterializedTable>
    where
        S: SourceSession + ?Sized,
    {
        let name = resolve_table_with(query, self.config.resolution)?.to_string();
        debug!("Caching query result as '{}'", name);

        let table = convert_with_batch_size(query, session, self.config.batch_size).await?;
        self.publish(&name, table.clone())?;
        Ok(table)
    }

    /// Register `table` in the store and the directory as one step
    fn publish(&self, name: &str, table: MaterializedTable) -> Result<()> {
        let result = self.directory.put_with(name, table, |table| {
            let mut session = self.store.begin();
            session.register(name, table.clone())?;
            session.commit()
        });

        match result {
            Ok(previous) => {
                self.stats.record_registration();
                self.refresh_gauges();
                info!(
                    "Cached table '{}'{}",
                    name,
                    if previous.is_some() { " (replaced)" } else { "" }
                );
                Ok(())
            }
            Err(e) => {
                self.stats.record_failed_registration();
                warn!("Failed to cache '{}': {}", name, e);
                Err(e)
            }
        }
    }

    /// The most recently cached table for `name`
    pub fn get(&self, name: &str) -> Result<MaterializedTable> {
        match self.directory.get(name) {
            Ok(table) => {
                self.stats.record_hit();
                Ok(table)
            }
            Err(e) => {
                self.stats.record_miss();
                Err(e)
            }
        }
    }

    /// Open a read-only session on the analytical store.
    ///
    /// Cached tables only change through [`query_db`](Self::query_db) and
    /// [`invalidate`](Self::invalidate).
    pub fn begin(&self) -> ReadSession<'_> {
        self.store.reader()
    }

    /// Drop `name` from the store and the directory together
    pub fn invalidate(&self, name: &str) -> Result<bool> {
        let removed = self.directory.remove_with(name, |name| {
            self.store.deregister(name)?;
            Ok(())
        })?;
        if removed.is_some() {
            self.refresh_gauges();
            info!("Invalidated cached table '{}'", name);
        }
        Ok(removed.is_some())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.directory.contains(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.directory.names()
    }

    /// Names bound in the analytical store by this cache
    pub fn registered_tables(&self) -> Vec<String> {
        self.store.table_names()
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn refresh_gauges(&self) {
        self.stats.set_entry_count(self.directory.len() as u64);
        self.stats
            .set_memory_bytes(self.directory.memory_bytes() as u64);
    }
}

impl Default for SqlCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for SqlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlCache")
            .field("tables", &self.table_names())
            .field("config", &self.config)
            .finish()
    }
}
