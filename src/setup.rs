//! The `gcp_setup` job: create the GCS bucket, then the BigQuery dataset.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

use crate::config::GcpSetupConfig;
use crate::dag::{Dag, DefaultArgs, Schedule};
use crate::gcp::{
    BucketApi, BucketSpec, CreateBucketOperator, CreateDatasetOperator, CreateOutcome, DatasetApi,
    DatasetSpec,
};

pub const DAG_ID: &str = "07_gcp_setup";
pub const CREATE_BUCKET: &str = "create_gcs_bucket";
pub const CREATE_DATASET: &str = "create_bq_dataset";

pub fn build_dag(
    config: &GcpSetupConfig,
    buckets: Arc<dyn BucketApi>,
    datasets: Arc<dyn DatasetApi>,
) -> Result<Dag> {
    let mut dag = Dag::new(DAG_ID)
        .description("Configure GCP resources (Bucket and Dataset)")
        .schedule(Schedule::Manual)
        .start_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default())
        .catchup(false)
        .tags(["gcp", "setup"])
        .default_args(DefaultArgs {
            owner: "airflow".to_string(),
            depends_on_past: false,
            retries: 1,
            retry_delay: config.retry_delay(),
        });

    dag.add_task(
        CREATE_BUCKET,
        Arc::new(CreateBucketOperator::new(buckets, config.bucket_spec())),
    )?;
    dag.add_task(
        CREATE_DATASET,
        Arc::new(CreateDatasetOperator::new(datasets, config.dataset_spec(), true)),
    )?;
    dag.set_downstream(CREATE_BUCKET, CREATE_DATASET)?;

    Ok(dag)
}

/// Stand-in provider for building the graph without credentials, e.g. for `--list`.
pub struct Unconnected;

#[async_trait]
impl BucketApi for Unconnected {
    async fn create_bucket(&self, spec: &BucketSpec) -> Result<CreateOutcome> {
        bail!("not connected to GCP; cannot create bucket {}", spec.name)
    }
}

#[async_trait]
impl DatasetApi for Unconnected {
    async fn create_dataset(&self, spec: &DatasetSpec) -> Result<CreateOutcome> {
        bail!("not connected to GCP; cannot create dataset {}", spec.dataset_id)
    }
}

/// Human-readable listing of `dag`, one task per line in execution order.
pub fn render(dag: &Dag) -> Result<String> {
    let mut out = format!(
        "{} ({}) schedule={:?} retries={} tags=[{}]\n",
        dag.dag_id,
        dag.description,
        dag.schedule,
        dag.default_args.retries,
        dag.tags.join(", ")
    );
    for task in dag.execution_order()? {
        let upstream = dag.upstream_of(&task.task_id)?;
        let after = if upstream.is_empty() {
            String::new()
        } else {
            format!(" (after {})", upstream.join(", "))
        };
        out.push_str(&format!(
            "  {}: {}{}\n",
            task.task_id,
            task.operator.describe(),
            after
        ));
    }
    Ok(out)
}
