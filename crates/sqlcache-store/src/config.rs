//! Analytical store configuration

use serde::{Deserialize, Serialize};

/// Configuration for the embedded analytical engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Parallelism used by the engine when executing queries
    pub target_partitions: usize,
    /// Rows per batch produced by engine queries
    pub batch_size: usize,
    /// Maximum number of cached tables bound in the engine
    pub max_tables: Option<usize>,
    /// Largest single table (approximate bytes) the engine accepts
    pub max_table_bytes: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            target_partitions: 4,
            batch_size: 8192,
            max_tables: None,
            max_table_bytes: None,
        }
    }
}

impl StoreConfig {
    pub fn with_target_partitions(mut self, target_partitions: usize) -> Self {
        self.target_partitions = target_partitions;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Limit the number of cached tables
    pub fn with_max_tables(mut self, max_tables: usize) -> Self {
        self.max_tables = Some(max_tables);
        self
    }

    /// Limit the size of a single cached table
    pub fn with_max_table_bytes(mut self, max_table_bytes: usize) -> Self {
        self.max_table_bytes = Some(max_table_bytes);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.target_partitions, 4);
        assert_eq!(config.batch_size, 8192);
        assert!(config.max_tables.is_none());
        assert!(config.max_table_bytes.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = StoreConfig::default()
            .with_target_partitions(1)
            .with_batch_size(1024)
            .with_max_tables(2)
            .with_max_table_bytes(1 << 20);

        assert_eq!(config.target_partitions, 1);
        assert_eq!(config.batch_size, 1024);
        assert_eq!(config.max_tables, Some(2));
        assert_eq!(config.max_table_bytes, Some(1 << 20));
    }
}
