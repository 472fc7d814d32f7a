use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{BucketApi, BucketSpec, CreateOutcome, DatasetApi, DatasetSpec};
use crate::dag::{Operator, TaskContext};

/// Creates a Cloud Storage bucket. An existing bucket of the same name is logged and accepted.
pub struct CreateBucketOperator {
    api: Arc<dyn BucketApi>,
    spec: BucketSpec,
}

impl CreateBucketOperator {
    pub fn new(api: Arc<dyn BucketApi>, spec: BucketSpec) -> Self {
        Self { api, spec }
    }
}

#[async_trait]
impl Operator for CreateBucketOperator {
    async fn execute(&self, ctx: &TaskContext) -> Result<()> {
        info!(
            dag = %ctx.dag_id,
            task = %ctx.task_id,
            try_number = ctx.try_number,
            bucket = %self.spec.name,
            location = %self.spec.location,
            storage_class = %self.spec.storage_class,
            "creating bucket"
        );
        match self.api.create_bucket(&self.spec).await? {
            CreateOutcome::Created => {}
            CreateOutcome::AlreadyExists => {
                warn!(bucket = %self.spec.name, "bucket already exists")
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "create bucket gs://{} ({}, {})",
            self.spec.name, self.spec.location, self.spec.storage_class
        )
    }
}

/// Creates an empty BigQuery dataset. With `exists_ok`, an existing dataset counts as success.
pub struct CreateDatasetOperator {
    api: Arc<dyn DatasetApi>,
    spec: DatasetSpec,
    exists_ok: bool,
}

impl CreateDatasetOperator {
    pub fn new(api: Arc<dyn DatasetApi>, spec: DatasetSpec, exists_ok: bool) -> Self {
        Self {
            api,
            spec,
            exists_ok,
        }
    }
}

#[async_trait]
impl Operator for CreateDatasetOperator {
    async fn execute(&self, ctx: &TaskContext) -> Result<()> {
        info!(
            dag = %ctx.dag_id,
            task = %ctx.task_id,
            try_number = ctx.try_number,
            project = %self.spec.project_id,
            dataset = %self.spec.dataset_id,
            location = %self.spec.location,
            "creating dataset"
        );
        match self.api.create_dataset(&self.spec).await? {
            CreateOutcome::Created => Ok(()),
            CreateOutcome::AlreadyExists if self.exists_ok => {
                info!(dataset = %self.spec.dataset_id, "dataset already exists");
                Ok(())
            }
            CreateOutcome::AlreadyExists => bail!(
                "dataset {}.{} already exists",
                self.spec.project_id,
                self.spec.dataset_id
            ),
        }
    }

    fn describe(&self) -> String {
        format!(
            "create dataset {}.{} ({}, exists_ok={})",
            self.spec.project_id, self.spec.dataset_id, self.spec.location, self.exists_ok
        )
    }
}
