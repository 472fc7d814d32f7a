//! Download the zone lookup and trip data, then replace both tables.

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::time::Instant;
use tracing::info;
use url::Url;

use crate::config::IngestConfig;
use crate::fetch;
use crate::load;
use crate::table::{self, Table};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Parquet,
}

/// A remote file and the table it replaces.
#[derive(Clone, Debug)]
pub struct Source {
    pub url: String,
    pub format: SourceFormat,
    pub table: String,
}

#[derive(Clone, Debug)]
pub struct LoadedTable {
    pub table: String,
    pub rows: u64,
}

#[derive(Clone, Debug)]
pub struct IngestSummary {
    pub tables: Vec<LoadedTable>,
}

impl IngestConfig {
    /// Zones first, then trips.
    pub fn sources(&self) -> Vec<Source> {
        vec![
            Source {
                url: self.zones_url.clone(),
                format: SourceFormat::Csv,
                table: self.zones_table.clone(),
            },
            Source {
                url: self.trips_url.clone(),
                format: SourceFormat::Parquet,
                table: self.trips_table.clone(),
            },
        ]
    }
}

/// Download `source` and decode it into memory.
pub async fn materialize(client: &Client, source: &Source) -> Result<Table> {
    let url = Url::parse(&source.url).with_context(|| format!("parsing URL {}", source.url))?;
    let name = fetch::file_name(&url);
    let bytes = fetch::download(client, &source.url).await?;

    let table = match source.format {
        SourceFormat::Csv => table::read_csv(&name, bytes)?,
        SourceFormat::Parquet => table::read_parquet(&name, bytes)?,
    };
    info!(source = %name, rows = table.num_rows(), columns = table.num_columns(), "loaded");
    Ok(table)
}

/// Fetch every source, then replace every table, in order. The first error aborts the run;
/// tables already replaced by then stay replaced.
pub async fn run(config: &IngestConfig) -> Result<IngestSummary> {
    let start = Instant::now();
    let client = Client::new();
    let sources = config.sources();

    let mut tables = Vec::with_capacity(sources.len());
    for source in &sources {
        info!(url = %source.url, "downloading and reading");
        tables.push(materialize(&client, source).await?);
    }

    let mut db = load::connect(&config.db()).await?;

    let mut loaded = Vec::with_capacity(sources.len());
    for (source, table) in sources.iter().zip(&tables) {
        info!(table = %source.table, "creating table");
        let rows = load::replace_table(&mut db, &source.table, table).await?;
        loaded.push(LoadedTable {
            table: source.table.clone(),
            rows,
        });
    }

    info!(elapsed = ?start.elapsed(), "ingestion completed");
    Ok(IngestSummary { tables: loaded })
}
