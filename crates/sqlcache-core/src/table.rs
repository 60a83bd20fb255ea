//! Materialized query results

use crate::error::Result;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Immutable snapshot of a query's result set.
///
/// Cloning is cheap: batches share their buffers, so the copy held by the
/// cache directory and the one registered in the analytical store are the
/// same data.
#[derive(Debug, Clone)]
pub struct MaterializedTable {
    schema: SchemaRef,
    batches: Arc<[RecordBatch]>,
}

impl MaterializedTable {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self {
            schema,
            batches: batches.into(),
        }
    }

    pub fn empty(schema: SchemaRef) -> Self {
        Self::new(schema, Vec::new())
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect()
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Approximate in-memory size in bytes
    pub fn size_bytes(&self) -> usize {
        self.batches
            .iter()
            .map(|batch| {
                batch
                    .columns()
                    .iter()
                    .map(|col| col.get_array_memory_size())
                    .sum::<usize>()
            })
            .sum()
    }

    /// All rows as a single batch
    pub fn concat(&self) -> Result<RecordBatch> {
        Ok(concat_batches(&self.schema, self.batches.iter())?)
    }

    /// True when both tables share the same underlying batches
    pub fn ptr_eq(&self, other: &MaterializedTable) -> bool {
        Arc::ptr_eq(&self.batches, &other.batches)
    }
}
