use anyhow::{bail, Context, Result};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::debug;

use super::{Table, BATCH_SIZE};

/// Decode a Parquet file held in memory. The file's own Arrow schema is kept as-is.
pub fn read_parquet(name: &str, bytes: Bytes) -> Result<Table> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)
        .with_context(|| format!("opening Parquet footer of {}", name))?;

    let metadata = builder.metadata();
    debug!(
        name,
        row_groups = metadata.num_row_groups(),
        rows = metadata.file_metadata().num_rows(),
        "parquet metadata"
    );

    let schema = builder.schema().clone();
    if schema.fields().is_empty() {
        bail!("{} has no columns", name);
    }
    let reader = builder
        .with_batch_size(BATCH_SIZE)
        .build()
        .with_context(|| format!("building Parquet reader for {}", name))?;

    let batches = reader
        .collect::<Result<Vec<RecordBatch>, _>>()
        .with_context(|| format!("decoding Parquet rows of {}", name))?;

    Ok(Table {
        name: name.to_string(),
        schema,
        batches,
    })
}
