use async_trait::async_trait;
use sqlcache_core::{Result, SelectQuery, Value};

/// Rows drained from a source database, in select-list order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}

/// A live session on the primary store.
///
/// Implementations own connection handling and transaction boundaries; the
/// cache only asks them to run a query and hand back every row. Failures of
/// the source itself are reported as `CacheError::QueryExecution`.
#[async_trait]
pub trait SourceSession: Send + Sync {
    async fn fetch(&self, query: &SelectQuery) -> Result<ResultSet>;
}

