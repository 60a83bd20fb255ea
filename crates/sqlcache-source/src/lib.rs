//! Source-side half of the SQL result cache
//!
//! A [`SourceSession`] runs a structured query against the primary store and
//! drains its rows; [`convert`] turns those rows into a typed Arrow table.

pub mod convert;
pub mod session;
pub mod sqlite;

pub use convert::{convert, convert_with_batch_size, result_set_to_table, DEFAULT_BATCH_SIZE};
pub use session::{ResultSet, SourceSession};
pub use sqlite::SqliteSource;
