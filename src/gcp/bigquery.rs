use anyhow::{Context, Result};
use async_trait::async_trait;
use google_cloud_bigquery::client::{Client, ClientConfig};
use google_cloud_bigquery::http::dataset::{Dataset, DatasetReference};
use google_cloud_bigquery::http::error::Error;
use tracing::{debug, info};

use super::{CreateOutcome, DatasetApi, DatasetSpec, CONFLICT};

/// BigQuery dataset creation through Application Default Credentials.
pub struct BigQueryDatasets {
    client: Client,
}

impl BigQueryDatasets {
    pub async fn from_env() -> Result<Self> {
        let (config, project) = ClientConfig::new_with_auth()
            .await
            .context("authenticating BigQuery client")?;
        debug!(credentials_project = ?project, "bigquery credentials loaded");
        let client = Client::new(config)
            .await
            .context("creating BigQuery client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DatasetApi for BigQueryDatasets {
    async fn create_dataset(&self, spec: &DatasetSpec) -> Result<CreateOutcome> {
        let dataset = Dataset {
            dataset_reference: DatasetReference {
                dataset_id: spec.dataset_id.clone(),
                project_id: spec.project_id.clone(),
            },
            location: spec.location.clone(),
            ..Default::default()
        };
        debug!(dataset = %spec.dataset_id, project = %spec.project_id, "insert dataset");

        match self.client.dataset().create(&dataset).await {
            Ok(created) => {
                info!(dataset = %created.dataset_reference.dataset_id, location = %created.location, "dataset created");
                Ok(CreateOutcome::Created)
            }
            Err(Error::Response(resp)) if resp.code == CONFLICT => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(e).with_context(|| {
                format!("creating dataset {}.{}", spec.project_id, spec.dataset_id)
            }),
        }
    }
}
