use anyhow::{anyhow, Context, Result};
use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Date32Array, Float32Array, Float64Array,
    Int16Array, Int32Array, Int64Array, TimestampMicrosecondArray,
};
use arrow::buffer::NullBuffer;
use arrow::compute::{cast_with_options, CastOptions};
use arrow::datatypes::{
    DataType, Date32Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type,
    TimestampMicrosecondType,
};
use arrow::record_batch::RecordBatch;
use arrow::temporal_conversions::{date32_to_datetime, timestamp_us_to_datetime};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::error::Error;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

use super::types::PgColumnType;

/// One cell, already converted to the Rust type its column's wire type expects.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue<'a> {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    Bytes(&'a [u8]),
    Text(String),
}

impl ToSql for PgValue<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            PgValue::Null => Ok(IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::I16(v) => v.to_sql(ty, out),
            PgValue::I32(v) => v.to_sql(ty, out),
            PgValue::I64(v) => v.to_sql(ty, out),
            PgValue::F32(v) => v.to_sql(ty, out),
            PgValue::F64(v) => v.to_sql(ty, out),
            PgValue::Timestamp(v) => v.to_sql(ty, out),
            PgValue::TimestampTz(v) => v.to_sql(ty, out),
            PgValue::Date(v) => v.to_sql(ty, out),
            PgValue::Bytes(v) => v.to_sql(ty, out),
            PgValue::Text(v) => v.to_sql(ty, out),
        }
    }

    // Column types are fixed up front by `PgColumnType`, so every cell matches its column.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Cast every column of `batch` to the Arrow type its Postgres column expects.
/// Casts are strict: a value that does not fit (e.g. a `UInt64` above `i64::MAX`) is an error.
pub fn prepare_columns(batch: &RecordBatch, types: &[PgColumnType]) -> Result<Vec<ArrayRef>> {
    let options = CastOptions {
        safe: false,
        format_options: FormatOptions::default(),
    };
    let schema = batch.schema();

    batch
        .columns()
        .iter()
        .zip(types)
        .zip(schema.fields())
        .map(|((column, ty), field)| match ty.arrow_target() {
            Some(target) if column.data_type() != &target => {
                cast_with_options(column, &target, &options).with_context(|| {
                    format!(
                        "casting column {} from {} to {}",
                        field.name(),
                        column.data_type(),
                        target
                    )
                })
            }
            _ => Ok(column.clone()),
        })
        .collect()
}

enum Values<'a> {
    Nulls,
    Bool(&'a BooleanArray),
    I16(&'a Int16Array),
    I32(&'a Int32Array),
    I64(&'a Int64Array),
    F32(&'a Float32Array),
    F64(&'a Float64Array),
    Timestamp(&'a TimestampMicrosecondArray),
    TimestampTz(&'a TimestampMicrosecondArray),
    Date(&'a Date32Array),
    Bytes(&'a BinaryArray),
    Text(ArrayFormatter<'a>),
}

struct ColumnEncoder<'a> {
    nulls: Option<NullBuffer>,
    values: Values<'a>,
}

impl<'a> ColumnEncoder<'a> {
    fn new(array: &'a ArrayRef, ty: PgColumnType) -> Result<Self> {
        let values = match ty {
            _ if array.data_type() == &DataType::Null => Values::Nulls,
            PgColumnType::Boolean => Values::Bool(array.as_boolean()),
            PgColumnType::SmallInt => Values::I16(array.as_primitive::<Int16Type>()),
            PgColumnType::Integer => Values::I32(array.as_primitive::<Int32Type>()),
            PgColumnType::BigInt => Values::I64(array.as_primitive::<Int64Type>()),
            PgColumnType::Real => Values::F32(array.as_primitive::<Float32Type>()),
            PgColumnType::Double => Values::F64(array.as_primitive::<Float64Type>()),
            PgColumnType::Timestamp => {
                Values::Timestamp(array.as_primitive::<TimestampMicrosecondType>())
            }
            PgColumnType::TimestampTz => {
                Values::TimestampTz(array.as_primitive::<TimestampMicrosecondType>())
            }
            PgColumnType::Date => Values::Date(array.as_primitive::<Date32Type>()),
            PgColumnType::Bytea => Values::Bytes(array.as_binary::<i32>()),
            PgColumnType::Text => Values::Text(ArrayFormatter::try_new(
                array.as_ref(),
                &FormatOptions::default(),
            )?),
        };
        Ok(Self {
            nulls: array.logical_nulls(),
            values,
        })
    }

    fn value(&self, row: usize) -> Result<PgValue<'a>> {
        if self.nulls.as_ref().is_some_and(|n| n.is_null(row)) {
            return Ok(PgValue::Null);
        }
        Ok(match &self.values {
            Values::Nulls => PgValue::Null,
            Values::Bool(a) => PgValue::Bool(a.value(row)),
            Values::I16(a) => PgValue::I16(a.value(row)),
            Values::I32(a) => PgValue::I32(a.value(row)),
            Values::I64(a) => PgValue::I64(a.value(row)),
            Values::F32(a) => PgValue::F32(a.value(row)),
            Values::F64(a) => PgValue::F64(a.value(row)),
            Values::Timestamp(a) => PgValue::Timestamp(micros(a.value(row))?),
            Values::TimestampTz(a) => PgValue::TimestampTz(micros(a.value(row))?.and_utc()),
            Values::Date(a) => {
                let days = a.value(row);
                let date = date32_to_datetime(days)
                    .ok_or_else(|| anyhow!("date out of range: {} days", days))?;
                PgValue::Date(date.date())
            }
            Values::Bytes(a) => PgValue::Bytes(a.value(row)),
            Values::Text(f) => PgValue::Text(f.value(row).try_to_string()?),
        })
    }
}

fn micros(v: i64) -> Result<NaiveDateTime> {
    timestamp_us_to_datetime(v).ok_or_else(|| anyhow!("timestamp out of range: {} µs", v))
}

/// Turns the prepared columns of one batch into rows of `PgValue`s.
pub struct RowEncoder<'a> {
    columns: Vec<ColumnEncoder<'a>>,
}

impl<'a> RowEncoder<'a> {
    pub fn new(prepared: &'a [ArrayRef], types: &[PgColumnType]) -> Result<Self> {
        let columns = prepared
            .iter()
            .zip(types)
            .map(|(array, ty)| ColumnEncoder::new(array, *ty))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    pub fn row(&self, row: usize) -> Result<Vec<PgValue<'a>>> {
        self.columns.iter().map(|c| c.value(row)).collect()
    }
}
