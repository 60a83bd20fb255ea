//! Embedded analytical store
//!
//! One DataFusion `SessionContext` per store instance holds every cached
//! table. Catalog changes only happen through [`CacheSession::commit`], which
//! applies all staged bindings or none of them.

use crate::config::StoreConfig;
use ahash::AHashMap;
use crate::session::{CacheSession, ReadSession};
use datafusion::datasource::TableProvider;
use datafusion::datasource::MemTable;
use datafusion::error::DataFusionError;
use datafusion::prelude::{SessionConfig, SessionContext};
use datafusion::sql::TableReference;
use parking_lot::{Mutex, RwLock};
use sqlcache_core::{CacheError, MaterializedTable, Result, Schema};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct AnalyticalStore {
    ctx: SessionContext,
    /// Tables bound by the cache, with their approximate size
    owned: RwLock<AHashMap<String, usize>>,
    /// Serializes catalog commits
    commit_lock: Mutex<()>,
    config: StoreConfig,
}

impl AnalyticalStore {
    pub fn new(config: StoreConfig) -> Self {
        let session_config = SessionConfig::new()
            .with_target_partitions(config.target_partitions.max(1))
            .with_batch_size(config.batch_size.max(1))
            .with_information_schema(true);

        Self {
            ctx: SessionContext::new_with_config(session_config),
            owned: RwLock::new(AHashMap::new()),
            commit_lock: Mutex::new(()),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(StoreConfig::default())
    }

    /// Open a scoped session. Staged registrations are discarded unless the
    /// session is committed.
    pub fn begin(&self) -> CacheSession<'_> {
        CacheSession::new(self)
    }

    /// Read-only access to the committed tables
    pub fn reader(&self) -> ReadSession<'_> {
        ReadSession::new(self)
    }

    /// Run `f` in a session, committing on `Ok` and rolling back on `Err`
    pub fn transaction<T>(&self, f: impl FnOnce(&mut CacheSession<'_>) -> Result<T>) -> Result<T> {
        let mut session = self.begin();
        match f(&mut session) {
            Ok(value) => {
                session.commit()?;
                Ok(value)
            }
            Err(err) => {
                session.rollback();
                Err(err)
            }
        }
    }

    /// Bind `table` under `name` in its own transaction
    pub fn register(&self, name: &str, table: MaterializedTable) -> Result<()> {
        self.transaction(|session| session.register(name, table))
    }

    /// Remove a table previously bound by the cache
    pub fn deregister(&self, name: &str) -> Result<bool> {
        let _guard = self.commit_lock.lock();
        if !self.owned.read().contains_key(name) {
            return Ok(false);
        }
        self.ctx
            .deregister_table(TableReference::bare(name))
            .map_err(|e| CacheError::Engine(e.to_string()))?;
        self.owned.write().remove(name);
        info!("Deregistered cached table '{}'", name);
        Ok(true)
    }

    /// True if the cache has bound a table under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.owned.read().contains_key(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.owned.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Approximate bytes held by cached tables
    pub fn memory_bytes(&self) -> usize {
        self.owned.read().values().sum()
    }

    /// The underlying engine handle
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Checks that do not depend on the rest of the transaction
    pub(crate) fn validate(&self, name: &str, table: &MaterializedTable) -> Result<()> {
        if name.is_empty() {
            return Err(CacheError::registration(name, "table name is empty"));
        }
        if name.contains('.') {
            return Err(CacheError::registration(
                name,
                "table name must not be qualified",
            ));
        }

        let schema = Schema::from_arrow(&table.schema())
            .map_err(|e| CacheError::registration(name, e.to_string()))?;
        if let Some(column) = schema.duplicate_name() {
            return Err(CacheError::registration(
                name,
                format!("duplicate column name '{}'", column),
            ));
        }

        if let Some(limit) = self.config.max_table_bytes {
            let size = table.size_bytes();
            if size > limit {
                return Err(CacheError::registration(
                    name,
                    format!("table size {} bytes exceeds limit of {} bytes", size, limit),
                ));
            }
        }
        Ok(())
    }

    /// Apply staged bindings atomically
    pub(crate) fn commit(&self, staged: Vec<(String, MaterializedTable)>) -> Result<()> {
        if staged.is_empty() {
            return Ok(());
        }
        let _guard = self.commit_lock.lock();

        self.check_catalog(&staged)?;

        let mut providers = Vec::with_capacity(staged.len());
        for (name, table) in &staged {
            let provider = MemTable::try_new(table.schema(), vec![table.batches().to_vec()])
                .map_err(|e| CacheError::registration(name.as_str(), e.to_string()))?;
            providers.push(Arc::new(provider) as Arc<dyn TableProvider>);
        }

        let mut undo: Vec<(String, Option<Arc<dyn TableProvider>>)> = Vec::new();
        for ((name, _), provider) in staged.iter().zip(providers) {
            if let Err(e) = self.swap(name, provider, &mut undo) {
                warn!("Registration of '{}' failed, restoring catalog: {}", name, e);
                self.restore(undo);
                return Err(CacheError::registration(name.as_str(), e.to_string()));
            }
        }

        let mut owned = self.owned.write();
        for (name, table) in &staged {
            owned.insert(name.clone(), table.size_bytes());
            info!(
                "Registered table '{}' ({} rows)",
                name,
                table.num_rows()
            );
        }
        Ok(())
    }

    /// Reject bindings that would clobber foreign tables or exceed limits
    fn check_catalog(&self, staged: &[(String, MaterializedTable)]) -> Result<()> {
        let owned = self.owned.read();

        for (name, _) in staged {
            if owned.contains_key(name) {
                continue;
            }
            let exists = self
                .ctx
                .table_exist(TableReference::bare(name.as_str()))
                .map_err(|e| CacheError::registration(name.as_str(), e.to_string()))?;
            if exists {
                return Err(CacheError::registration(
                    name.as_str(),
                    "name is bound to a table not owned by the cache",
                ));
            }
        }

        if let Some(max_tables) = self.config.max_tables {
            let new_names = staged
                .iter()
                .filter(|(name, _)| !owned.contains_key(name))
                .count();
            if owned.len() + new_names > max_tables {
                let name = staged
                    .iter()
                    .map(|(name, _)| name.as_str())
                    .find(|name| !owned.contains_key(*name))
                    .unwrap_or_default();
                return Err(CacheError::registration(
                    name,
                    format!("store is limited to {} tables", max_tables),
                ));
            }
        }
        Ok(())
    }

    fn swap(
        &self,
        name: &str,
        provider: Arc<dyn TableProvider>,
        undo: &mut Vec<(String, Option<Arc<dyn TableProvider>>)>,
    ) -> std::result::Result<(), DataFusionError> {
        let previous = self.ctx.deregister_table(TableReference::bare(name))?;
        undo.push((name.to_string(), previous));
        self.ctx.register_table(TableReference::bare(name), provider)?;
        debug!("Bound '{}' in analytical store", name);
        Ok(())
    }

    fn restore(&self, undo: Vec<(String, Option<Arc<dyn TableProvider>>)>) {
        for (name, previous) in undo.into_iter().rev() {
            let reference = TableReference::bare(name.as_str());
            if let Err(e) = self.ctx.deregister_table(reference.clone()) {
                warn!("Failed to unbind '{}' during restore: {}", name, e);
            }
            if let Some(provider) = previous {
                if let Err(e) = self.ctx.register_table(reference, provider) {
                    warn!("Failed to restore '{}': {}", name, e);
                }
            }
        }
    }
}

impl Default for AnalyticalStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for AnalyticalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticalStore")
            .field("tables", &self.table_names())
            .field("memory_bytes", &self.memory_bytes())
            .field("config", &self.config)
            .finish()
    }
}
