//! Name to table directory

use ahash::AHashMap;
use parking_lot::RwLock;
use sqlcache_core::{CacheError, MaterializedTable, Result};

/// Most recent materialization of each cached table.
///
/// Entries are replaced wholesale; there is no eviction and nothing outlives
/// the directory itself.
#[derive(Debug, Default)]
pub struct CacheDirectory {
    entries: RwLock<AHashMap<String, MaterializedTable>>,
}

impl CacheDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `name`, returning the previous one
    pub fn put(&self, name: impl Into<String>, table: MaterializedTable) -> Option<MaterializedTable> {
        self.entries.write().insert(name.into(), table)
    }

    /// Run `apply` under the write lock and insert only if it succeeds.
    ///
    /// Readers never see the new entry before `apply` has completed, and two
    /// writers on the directory never interleave.
    pub fn put_with<F>(
        &self,
        name: &str,
        table: MaterializedTable,
        apply: F,
    ) -> Result<Option<MaterializedTable>>
    where
        F: FnOnce(&MaterializedTable) -> Result<()>,
    {
        let mut entries = self.entries.write();
        apply(&table)?;
        Ok(entries.insert(name.to_string(), table))
    }

    pub fn get(&self, name: &str) -> Result<MaterializedTable> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::KeyNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Cached names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn remove(&self, name: &str) -> Option<MaterializedTable> {
        self.entries.write().remove(name)
    }

    /// Run `apply` under the write lock and remove the entry only if it succeeds
    pub fn remove_with<F>(&self, name: &str, apply: F) -> Result<Option<MaterializedTable>>
    where
        F: FnOnce(&str) -> Result<()>,
    {
        let mut entries = self.entries.write();
        if !entries.contains_key(name) {
            return Ok(None);
        }
        apply(name)?;
        Ok(entries.remove(name))
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Approximate bytes held by all entries
    pub fn memory_bytes(&self) -> usize {
        self.entries.read().values().map(|t| t.size_bytes()).sum()
    }
}
