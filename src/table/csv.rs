use anyhow::{bail, Context, Result};
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use regex::Regex;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

use super::{Table, BATCH_SIZE};

/// Cells read as NULL: empty, plus the usual spreadsheet/pandas missing-value markers.
const NULL_TOKENS: &str = r"^(|#N/A|#N/A N/A|#NA|-1\.#IND|-1\.#QNAN|-NaN|-nan|1\.#IND|1\.#QNAN|<NA>|N/A|NA|NULL|NaN|None|n/a|nan|null)$";

/// Decode a headed CSV. Column types are inferred from every row, not a sample.
pub fn read_csv(name: &str, bytes: Bytes) -> Result<Table> {
    let nulls = Regex::new(NULL_TOKENS).context("compiling CSV null pattern")?;
    let format = Format::default().with_header(true).with_null_regex(nulls);

    let (schema, scanned) = format
        .infer_schema(Cursor::new(&bytes[..]), None)
        .with_context(|| format!("inferring CSV schema for {}", name))?;
    if schema.fields().is_empty() {
        bail!("{} has no columns", name);
    }
    debug!(name, columns = schema.fields().len(), scanned, "inferred CSV schema");

    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(schema.clone())
        .with_format(format)
        .with_batch_size(BATCH_SIZE)
        .build(Cursor::new(bytes))
        .with_context(|| format!("creating CSV reader for {}", name))?;

    let batches = reader
        .collect::<Result<Vec<RecordBatch>, _>>()
        .with_context(|| format!("decoding CSV rows of {}", name))?;

    Ok(Table {
        name: name.to_string(),
        schema,
        batches,
    })
}
