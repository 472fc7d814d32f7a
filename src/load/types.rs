use arrow::datatypes::{DataType, Schema, TimeUnit};
use std::sync::Arc;
use tokio_postgres::types::Type;

/// PostgreSQL column type chosen for an Arrow field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PgColumnType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Timestamp,
    TimestampTz,
    Date,
    Bytea,
    Text,
}

impl PgColumnType {
    pub fn from_arrow(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean => Self::Boolean,
            DataType::Int8 | DataType::Int16 | DataType::UInt8 => Self::SmallInt,
            DataType::Int32 | DataType::UInt16 => Self::Integer,
            DataType::Int64 | DataType::UInt32 | DataType::UInt64 => Self::BigInt,
            DataType::Float16 | DataType::Float32 => Self::Real,
            DataType::Float64 | DataType::Decimal128(_, _) | DataType::Decimal256(_, _) => {
                Self::Double
            }
            DataType::Timestamp(_, None) => Self::Timestamp,
            DataType::Timestamp(_, Some(_)) => Self::TimestampTz,
            DataType::Date32 | DataType::Date64 => Self::Date,
            DataType::Binary
            | DataType::LargeBinary
            | DataType::BinaryView
            | DataType::FixedSizeBinary(_) => Self::Bytea,
            _ => Self::Text,
        }
    }

    pub fn ddl(self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::SmallInt => "SMALLINT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Real => "REAL",
            Self::Double => "DOUBLE PRECISION",
            Self::Timestamp => "TIMESTAMP WITHOUT TIME ZONE",
            Self::TimestampTz => "TIMESTAMP WITH TIME ZONE",
            Self::Date => "DATE",
            Self::Bytea => "BYTEA",
            Self::Text => "TEXT",
        }
    }

    /// Wire type announced to the binary COPY writer.
    pub fn pg_type(self) -> Type {
        match self {
            Self::Boolean => Type::BOOL,
            Self::SmallInt => Type::INT2,
            Self::Integer => Type::INT4,
            Self::BigInt => Type::INT8,
            Self::Real => Type::FLOAT4,
            Self::Double => Type::FLOAT8,
            Self::Timestamp => Type::TIMESTAMP,
            Self::TimestampTz => Type::TIMESTAMPTZ,
            Self::Date => Type::DATE,
            Self::Bytea => Type::BYTEA,
            Self::Text => Type::TEXT,
        }
    }

    /// Arrow type a column is cast to before encoding. `None` means the
    /// column is display-formatted as text instead of cast.
    pub fn arrow_target(self) -> Option<DataType> {
        match self {
            Self::Boolean => Some(DataType::Boolean),
            Self::SmallInt => Some(DataType::Int16),
            Self::Integer => Some(DataType::Int32),
            Self::BigInt => Some(DataType::Int64),
            Self::Real => Some(DataType::Float32),
            Self::Double => Some(DataType::Float64),
            Self::Timestamp => Some(DataType::Timestamp(TimeUnit::Microsecond, None)),
            Self::TimestampTz => Some(DataType::Timestamp(
                TimeUnit::Microsecond,
                Some(Arc::from("UTC")),
            )),
            Self::Date => Some(DataType::Date32),
            Self::Bytea => Some(DataType::Binary),
            Self::Text => None,
        }
    }
}

/// Double-quote an identifier, escaping embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn column_types(schema: &Schema) -> Vec<PgColumnType> {
    schema
        .fields()
        .iter()
        .map(|f| PgColumnType::from_arrow(f.data_type()))
        .collect()
}

pub fn create_table_sql(table: &str, schema: &Schema) -> String {
    let columns = schema
        .fields()
        .iter()
        .map(|f| {
            format!(
                "{} {}",
                quote_ident(f.name()),
                PgColumnType::from_arrow(f.data_type()).ddl()
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", quote_ident(table), columns)
}

pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(table))
}

pub fn copy_in_sql(table: &str, schema: &Schema) -> String {
    let columns = schema
        .fields()
        .iter()
        .map(|f| quote_ident(f.name()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "COPY {} ({}) FROM STDIN BINARY",
        quote_ident(table),
        columns
    )
}
