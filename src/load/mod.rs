//! Full-replace loading of in-memory tables into PostgreSQL.

pub mod encode;
pub mod types;

use anyhow::{bail, Context, Result};
use tokio::time::Instant;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info, instrument};

use crate::table::Table;
use encode::{prepare_columns, RowEncoder};
use types::{column_types, copy_in_sql, create_table_sql, drop_table_sql};

/// Where to connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl DbConfig {
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .password(&self.password)
            .application_name("taxi-pipeline");
        cfg
    }
}

/// Open a connection and drive it on a background task.
pub async fn connect(db: &DbConfig) -> Result<Client> {
    let (client, connection) = db
        .to_pg_config()
        .connect(NoTls)
        .await
        .with_context(|| {
            format!(
                "connecting to postgres at {}:{}/{} as {}",
                db.host, db.port, db.database, db.user
            )
        })?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!(error = %e, "postgres connection closed with error");
        }
    });

    info!(host = %db.host, port = db.port, database = %db.database, "connected");
    Ok(client)
}

/// Drop `table_name` if present, recreate it from `table`'s schema and copy every row in.
///
/// All three steps share one transaction, so a failed copy leaves the previous table intact.
/// Returns the row count the server reports for the copy, which must match `table.num_rows()`.
#[instrument(level = "info", skip(client, table), fields(source = %table.name, rows = table.num_rows()))]
pub async fn replace_table(client: &mut Client, table_name: &str, table: &Table) -> Result<u64> {
    if table.num_columns() == 0 {
        bail!("{} has no columns", table.name);
    }
    let start = Instant::now();
    let schema = table.schema.as_ref();
    let types = column_types(schema);
    let wire_types: Vec<Type> = types.iter().map(|t| t.pg_type()).collect();

    let tx = client
        .transaction()
        .await
        .context("starting transaction")?;

    tx.batch_execute(&drop_table_sql(table_name))
        .await
        .with_context(|| format!("dropping {}", table_name))?;
    let ddl = create_table_sql(table_name, schema);
    debug!(%ddl, "creating table");
    tx.batch_execute(&ddl)
        .await
        .with_context(|| format!("creating {}", table_name))?;

    let copy_sql = copy_in_sql(table_name, schema);
    let sink = tx
        .copy_in(copy_sql.as_str())
        .await
        .with_context(|| format!("starting COPY into {}", table_name))?;
    let writer = BinaryCopyInWriter::new(sink, &wire_types);
    tokio::pin!(writer);

    for (idx, batch) in table.batches.iter().enumerate() {
        let prepared = prepare_columns(batch, &types)
            .with_context(|| format!("preparing batch {} of {}", idx, table.name))?;
        let encoder = RowEncoder::new(&prepared, &types)?;
        for row in 0..batch.num_rows() {
            let values = encoder.row(row)?;
            let params: Vec<&(dyn ToSql + Sync)> =
                values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
            writer
                .as_mut()
                .write(&params)
                .await
                .with_context(|| format!("writing row {} of batch {} into {}", row, idx, table_name))?;
        }
    }

    let written = writer
        .finish()
        .await
        .with_context(|| format!("finishing COPY into {}", table_name))?;

    let expected = table.num_rows() as u64;
    if written != expected {
        bail!(
            "COPY into {} wrote {} rows, expected {}",
            table_name,
            written,
            expected
        );
    }

    tx.commit()
        .await
        .with_context(|| format!("committing {}", table_name))?;

    info!(table = table_name, rows = written, elapsed = ?start.elapsed(), "table replaced");
    Ok(written)
}

/// Row count of `table_name`, for verification.
pub async fn count_rows(client: &Client, table_name: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", types::quote_ident(table_name));
    let row = client
        .query_one(sql.as_str(), &[])
        .await
        .with_context(|| format!("counting rows of {}", table_name))?;
    Ok(row.get(0))
}
