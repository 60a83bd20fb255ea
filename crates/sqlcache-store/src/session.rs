//! Scoped sessions on the analytical store

use crate::store::AnalyticalStore;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use datafusion::execution::context::SQLOptions;
use datafusion::prelude::DataFrame;
use sqlcache_core::{CacheError, MaterializedTable, Result};
use tracing::debug;

/// Read-only access to the committed tables of an [`AnalyticalStore`].
///
/// Only SQL queries are accepted; DDL, DML and other statements are
/// rejected, so nothing reached through a reader can change the catalog.
///
/// Table names are case-sensitive and the engine lowercases unquoted
/// identifiers, so a table cached as `MyUser` has to be written
/// `"MyUser"` in SQL.
#[derive(Clone, Copy)]
pub struct ReadSession<'a> {
    store: &'a AnalyticalStore,
}

impl<'a> ReadSession<'a> {
    pub(crate) fn new(store: &'a AnalyticalStore) -> Self {
        Self { store }
    }

    /// Plan a read-only SQL statement against the committed tables
    pub async fn query(&self, sql: &str) -> Result<DataFrame> {
        let options = SQLOptions::new()
            .with_allow_ddl(false)
            .with_allow_dml(false)
            .with_allow_statements(false);

        self.store
            .context()
            .sql_with_options(sql, options)
            .await
            .map_err(|e| CacheError::Engine(e.to_string()))
    }

    /// Run a read-only SQL statement and collect every batch
    pub async fn sql(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        let df = self.query(sql).await?;
        df.collect()
            .await
            .map_err(|e| CacheError::Engine(e.to_string()))
    }

    /// Run a read-only SQL statement and keep the result as a table
    pub async fn sql_table(&self, sql: &str) -> Result<MaterializedTable> {
        let df = self.query(sql).await?;
        let schema: SchemaRef = df.schema().inner().clone();
        let batches = df
            .collect()
            .await
            .map_err(|e| CacheError::Engine(e.to_string()))?;
        Ok(MaterializedTable::new(schema, batches))
    }
}

impl std::fmt::Debug for ReadSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadSession").finish()
    }
}

/// A unit of work against an [`AnalyticalStore`].
///
/// Registrations are staged and only become visible to other sessions on
/// [`commit`](Self::commit). A session dropped without committing is rolled
/// back. Queries run inside the session see committed tables only.
pub struct CacheSession<'a> {
    store: &'a AnalyticalStore,
    staged: Vec<(String, MaterializedTable)>,
    finished: bool,
}

impl<'a> CacheSession<'a> {
    pub(crate) fn new(store: &'a AnalyticalStore) -> Self {
        Self {
            store,
            staged: Vec::new(),
            finished: false,
        }
    }

    /// Stage `table` under `name`, replacing any earlier staging of the same name
    pub fn register(&mut self, name: &str, table: MaterializedTable) -> Result<()> {
        self.store.validate(name, &table)?;

        match self.staged.iter_mut().find(|(staged, _)| staged == name) {
            Some(entry) => entry.1 = table,
            None => self.staged.push((name.to_string(), table)),
        }
        debug!("Staged table '{}'", name);
        Ok(())
    }

    /// Names staged in this session, in registration order
    pub fn staged(&self) -> Vec<&str> {
        self.staged.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Read-only view of the committed tables
    pub fn reader(&self) -> ReadSession<'a> {
        ReadSession::new(self.store)
    }

    pub async fn query(&self, sql: &str) -> Result<DataFrame> {
        self.reader().query(sql).await
    }

    pub async fn sql(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        self.reader().sql(sql).await
    }

    pub async fn sql_table(&self, sql: &str) -> Result<MaterializedTable> {
        self.reader().sql_table(sql).await
    }

    /// Apply every staged registration, or none of them
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        let staged = std::mem::take(&mut self.staged);
        self.store.commit(staged)
    }

    /// Discard staged registrations
    pub fn rollback(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        self.finished = true;
        if !self.staged.is_empty() {
            debug!("Rolled back {} staged table(s)", self.staged.len());
            self.staged.clear();
        }
    }
}

impl Drop for CacheSession<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.discard();
        }
    }
}

impl std::fmt::Debug for CacheSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheSession")
            .field("staged", &self.staged())
            .field("finished", &self.finished)
            .finish()
    }
}
