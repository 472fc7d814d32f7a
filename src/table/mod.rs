//! In-memory Arrow tables materialized from downloaded files.

mod csv;
mod parquet;

pub use self::csv::read_csv;
pub use self::parquet::read_parquet;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

/// Rows per decoded record batch.
pub const BATCH_SIZE: usize = 8_192;

/// One downloaded resource, held fully in memory.
#[derive(Debug, Clone)]
pub struct Table {
    /// Label used in logs (usually the source file name).
    pub name: String,
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl Table {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect()
    }
}
