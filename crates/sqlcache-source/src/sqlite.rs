//! SQLite-backed source sessions
//!
//! `rusqlite::Connection` is blocking and not `Sync`, so the connection sits
//! behind a `Mutex` and every query runs on Tokio's blocking pool. Dropping the
//! future returned by [`SourceSession::fetch`] abandons the rows; the query
//! itself never writes.

use crate::session::{ResultSet, SourceSession};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::{Type, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use sqlcache_core::{CacheError, Result, SelectQuery, SqlStatement, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A session on a SQLite database
#[derive(Clone)]
pub struct SqliteSource {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSource {
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(source_error)?;
        info!("Opened in-memory SQLite source");
        Ok(Self::from_connection(conn))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(source_error)?;
        info!("Opened SQLite source at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run one or more statements, e.g. schema setup or seeding
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql).map_err(source_error)
    }

    /// Run `f` with exclusive access to the underlying connection
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn).map_err(source_error)
    }

    fn run(conn: &Connection, stmt: &SqlStatement) -> rusqlite::Result<ResultSet> {
        let mut prepared = conn.prepare(&stmt.sql)?;
        let columns: Vec<String> = prepared
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let width = columns.len();

        let params = stmt.params.iter().map(to_sql_value);
        let mut rows = prepared.query(params_from_iter(params))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let values = (0..width)
                .map(|i| from_value_ref(i, row.get_ref(i)?))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            out.push(values);
        }

        Ok(ResultSet::new(columns, out))
    }
}

impl std::fmt::Debug for SqliteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSource").finish()
    }
}

#[async_trait]
impl SourceSession for SqliteSource {
    async fn fetch(&self, query: &SelectQuery) -> Result<ResultSet> {
        let stmt = query.to_sql()?;
        debug!("Source query: {}", stmt.sql);

        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            Self::run(&conn, &stmt)
        })
        .await
        .map_err(|e| CacheError::QueryExecution(format!("Task join error: {}", e)))?
        .map_err(source_error)
    }
}

fn source_error(err: rusqlite::Error) -> CacheError {
    CacheError::QueryExecution(err.to_string())
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Integer(*b as i64),
        Value::Int64(i) => SqlValue::Integer(*i),
        Value::Float64(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

/// TEXT cells must be valid UTF-8; anything else fails the query
fn from_value_ref(idx: usize, value: ValueRef<'_>) -> rusqlite::Result<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(t) => {
            let text = std::str::from_utf8(t).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })?;
            Value::Text(text.to_string())
        }
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::convert;
    use arrow::array::{Int64Array, StringArray};
    use sqlcache_core::{DataType, TableDef};

    fn seeded() -> SqliteSource {
        let source = SqliteSource::open_in_memory().unwrap();
        source
            .execute_batch(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
                 INSERT INTO users (id, name) VALUES (1, 'a'), (2, 'b'), (3, 'c');",
            )
            .unwrap();
        source
    }

    fn users() -> TableDef {
        TableDef::new("users")
            .column("id", DataType::Int64, false)
            .column("name", DataType::Utf8, false)
    }

    #[tokio::test]
    async fn test_fetch_all_rows() {
        let result = seeded().fetch(&users().select()).await.unwrap();
        assert_eq!(result.columns, vec!["id", "name"]);
        assert_eq!(result.num_rows(), 3);
        assert_eq!(result.rows[0], vec![Value::Int64(1), Value::from("a")]);
    }

    #[tokio::test]
    async fn test_fetch_binds_parameters() {
        let users = users();
        let query = users
            .select()
            .filter(users.col("id").unwrap().gt_eq(2i64))
            .order_by(users.col("id").unwrap(), false);
        let result = seeded().fetch(&query).await.unwrap();
        assert_eq!(result.num_rows(), 2);
        assert_eq!(result.rows[0][0], Value::Int64(3));
    }

    #[tokio::test]
    async fn test_missing_table_is_execution_error() {
        let source = SqliteSource::open_in_memory().unwrap();
        let err = source.fetch(&users().select()).await.unwrap_err();
        assert!(matches!(err, CacheError::QueryExecution(ref msg) if msg.contains("no such table")));
    }

    #[tokio::test]
    async fn test_convert_from_sqlite() {
        let table = convert(&users().select(), &seeded()).await.unwrap();
        let batch = table.concat().unwrap();
        let ids = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        let names = batch.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(ids.value(2), 3);
        assert_eq!(names.value(1), "b");
    }

    #[tokio::test]
    async fn test_invalid_utf8_text_is_rejected() {
        let source = SqliteSource::open_in_memory().unwrap();
        source
            .execute_batch(
                "CREATE TABLE notes (body TEXT NOT NULL);
                 INSERT INTO notes VALUES (CAST(x'66ff6f' AS TEXT));",
            )
            .unwrap();
        let notes = TableDef::new("notes").column("body", DataType::Utf8, false);

        let err = source.fetch(&notes.select()).await.unwrap_err();
        assert!(matches!(err, CacheError::QueryExecution(ref msg) if msg.contains("utf-8")));
    }

    #[test]
    fn test_with_connection() {
        let source = seeded();
        let count: i64 = source
            .with_connection(|conn| conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(count, 3);
    }
}
