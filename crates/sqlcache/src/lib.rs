//! Query-result cache backed by an embedded analytical store
//!
//! This crate runs single-table queries against a primary database, keeps
//! each result as a typed columnar table named after its source table, and
//! serves later reads, joins included, from an in-process analytical engine.
//!
//! # Features
//!
//! - **Table naming**: a query's result is cached under the one source table it selects from
//! - **Replace on refresh**: caching a table again replaces the previous result
//! - **Atomic publish**: the engine binding and the directory entry change together or not at all
//! - **Read-only sessions**: query cached tables with SQL; only the cache itself rebinds them
//! - **Statistics**: track lookups and registrations
//!
//! # Example
//!
//! ```ignore
//! use sqlcache::{CacheConfig, DataType, SqlCache, SqliteSource, TableDef};
//!
//! let source = SqliteSource::open("app.db")?;
//! let users = TableDef::new("users")
//!     .column("id", DataType::Int64, false)
//!     .column("name", DataType::Utf8, false);
//!
//! let cache = SqlCache::new(CacheConfig::default());
//! cache.query_db(&users.select(), &source).await?;
//!
//! let batches = cache.begin().sql("SELECT name FROM users WHERE id = 1").await?;
//! ```

pub mod config;
pub mod directory;
pub mod facade;
pub mod resolver;
pub mod stats;

pub use config::CacheConfig;
pub use directory::CacheDirectory;
pub use facade::SqlCache;
pub use resolver::{resolve_table, resolve_table_with, ResolutionPolicy};
pub use stats::CacheStats;

pub use sqlcache_core::{
    BinaryOp, CacheError, ColumnRef, DataType, Expr, MaterializedTable, Result, SelectQuery,
    TableDef, Value,
};
pub use sqlcache_source::{ResultSet, SourceSession, SqliteSource};
pub use sqlcache_store::{AnalyticalStore, CacheSession, ReadSession, StoreConfig};

pub use arrow;
