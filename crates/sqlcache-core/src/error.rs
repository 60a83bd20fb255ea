use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    #[error("Query execution error: {0}")]
    QueryExecution(String),

    #[error("Registration of table '{table}' failed: {reason}")]
    Registration { table: String, reason: String },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Table not cached: {0}")]
    KeyNotFound(String),

    #[error("Type mismatch in column '{column}': expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    pub fn registration(table: impl Into<String>, reason: impl Into<String>) -> Self {
        CacheError::Registration {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn type_mismatch(
        column: impl Into<String>,
        expected: impl ToString,
        found: impl Into<String>,
    ) -> Self {
        CacheError::TypeMismatch {
            column: column.into(),
            expected: expected.to_string(),
            found: found.into(),
        }
    }

    /// True for errors raised before anything touched the source or the cache.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CacheError::UnsupportedQuery(_))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
