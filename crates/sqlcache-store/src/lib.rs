//! Embedded analytical store for cached query results
//!
//! Cached tables are bound in an in-process DataFusion catalog and queried
//! with full SQL, joins included. Catalog changes go through scoped
//! [`CacheSession`]s that commit atomically or roll back when dropped.

pub mod config;
pub mod session;
pub mod store;

pub use config::StoreConfig;
pub use session::{CacheSession, ReadSession};
pub use store::AnalyticalStore;
