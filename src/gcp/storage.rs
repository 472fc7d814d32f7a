use anyhow::{Context, Result};
use async_trait::async_trait;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::buckets::insert::{
    BucketCreationConfig, InsertBucketParam, InsertBucketRequest,
};
use google_cloud_storage::http::Error;
use tracing::{debug, info};

use super::{BucketApi, BucketSpec, CreateOutcome, CONFLICT};

/// Cloud Storage bucket creation through Application Default Credentials.
pub struct GcsBuckets {
    client: Client,
}

impl GcsBuckets {
    pub async fn from_env() -> Result<Self> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .context("authenticating GCS client")?;
        Ok(Self {
            client: Client::new(config),
        })
    }
}

#[async_trait]
impl BucketApi for GcsBuckets {
    async fn create_bucket(&self, spec: &BucketSpec) -> Result<CreateOutcome> {
        let request = InsertBucketRequest {
            name: spec.name.clone(),
            param: InsertBucketParam {
                project: spec.project_id.clone(),
                ..Default::default()
            },
            bucket: BucketCreationConfig {
                location: spec.location.clone(),
                storage_class: Some(spec.storage_class.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        debug!(bucket = %spec.name, project = %spec.project_id, "insert bucket");

        match self.client.insert_bucket(&request).await {
            Ok(bucket) => {
                info!(bucket = %bucket.name, location = %bucket.location, "bucket created");
                Ok(CreateOutcome::Created)
            }
            Err(Error::Response(resp)) if resp.code == CONFLICT => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(e).with_context(|| format!("creating bucket gs://{}", spec.name)),
        }
    }
}
