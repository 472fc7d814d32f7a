use anyhow::{bail, Result};
use clap::Parser;
use std::sync::Arc;
use taxi_pipeline::{
    config::GcpSetupConfig,
    dag::{DagRun, RunState},
    gcp::{BigQueryDatasets, GcsBuckets},
    logging, setup,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("info");
    let config = GcpSetupConfig::parse();

    if config.list {
        let dag = setup::build_dag(
            &config,
            Arc::new(setup::Unconnected),
            Arc::new(setup::Unconnected),
        )?;
        print!("{}", setup::render(&dag)?);
        return Ok(());
    }

    info!(
        project = %config.project_id,
        bucket = %config.bucket,
        dataset = %config.dataset,
        location = %config.location,
        "startup"
    );
    let buckets = GcsBuckets::from_env().await?;
    let datasets = BigQueryDatasets::from_env().await?;
    let dag = setup::build_dag(&config, Arc::new(buckets), Arc::new(datasets))?;

    let report = DagRun::manual().execute(&dag).await?;

    if let Some(path) = &config.report {
        report.write_json(path)?;
        info!(path = %path.display(), "wrote run report");
    }

    if report.state != RunState::Success {
        bail!("dag run {} failed", report.run_id);
    }
    Ok(())
}
