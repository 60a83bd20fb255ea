pub mod error;
pub mod query;
pub mod schema;
pub mod table;
pub mod types;

pub use error::{CacheError, Result};
pub use query::{BinaryOp, ColumnRef, Expr, SelectItem, SelectQuery, SqlStatement, TableDef};
pub use schema::{Field, Schema};
pub use table::MaterializedTable;
pub use types::*;
