use anyhow::Result;
use clap::Parser;
use taxi_pipeline::{config::IngestConfig, ingest, logging};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("info");
    let config = IngestConfig::parse();
    info!(
        trips = %config.trips_url,
        zones = %config.zones_url,
        host = %config.pg_host,
        port = config.pg_port,
        database = %config.pg_database,
        "startup"
    );

    ingest::run(&config).await?;
    Ok(())
}
