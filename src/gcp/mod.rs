//! Google Cloud resource creation behind small traits, so the DAG can run against fakes.

mod bigquery;
mod operators;
mod storage;

pub use bigquery::BigQueryDatasets;
pub use operators::{CreateBucketOperator, CreateDatasetOperator};
pub use storage::GcsBuckets;

use anyhow::Result;
use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

/// HTTP status both APIs use for "resource already exists".
pub(crate) const CONFLICT: u16 = 409;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketSpec {
    pub name: String,
    pub project_id: String,
    pub location: String,
    pub storage_class: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetSpec {
    pub dataset_id: String,
    pub project_id: String,
    pub location: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait BucketApi: Send + Sync {
    async fn create_bucket(&self, spec: &BucketSpec) -> Result<CreateOutcome>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DatasetApi: Send + Sync {
    async fn create_dataset(&self, spec: &DatasetSpec) -> Result<CreateOutcome>;
}
