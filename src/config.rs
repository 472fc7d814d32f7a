//! Command-line and environment configuration for both binaries.
//!
//! Every setting has a flag, an environment variable and a default, so either program
//! runs with no configuration at all against the documented placeholders.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::gcp::{BucketSpec, DatasetSpec};
use crate::load::DbConfig;

pub const DEFAULT_TRIPS_URL: &str =
    "https://d37ci6vzurychx.cloudfront.net/trip-data/green_tripdata_2025-11.parquet";
pub const DEFAULT_ZONES_URL: &str =
    "https://github.com/DataTalksClub/nyc-tlc-data/releases/download/misc/taxi_zone_lookup.csv";

/// Download the green-taxi trip file and the zone lookup, and replace both tables in PostgreSQL.
#[derive(Parser, Debug, Clone)]
#[command(name = "taxi-pipeline", version)]
pub struct IngestConfig {
    /// Parquet trip-data file
    #[arg(long, env = "TRIPS_URL", default_value = DEFAULT_TRIPS_URL)]
    pub trips_url: String,

    /// Zone lookup CSV
    #[arg(long, env = "ZONES_URL", default_value = DEFAULT_ZONES_URL)]
    pub zones_url: String,

    #[arg(long, env = "TRIPS_TABLE", default_value = "green_taxi_trips")]
    pub trips_table: String,

    #[arg(long, env = "ZONES_TABLE", default_value = "zones")]
    pub zones_table: String,

    #[arg(long, env = "PG_HOST", default_value = "localhost")]
    pub pg_host: String,

    #[arg(long, env = "PG_PORT", default_value_t = 5433)]
    pub pg_port: u16,

    #[arg(long, env = "PG_DATABASE", default_value = "ny_taxi")]
    pub pg_database: String,

    #[arg(long, env = "PG_USER", default_value = "postgres")]
    pub pg_user: String,

    #[arg(long, env = "PG_PASSWORD", default_value = "postgres", hide_env_values = true)]
    pub pg_password: String,
}

impl IngestConfig {
    pub fn db(&self) -> DbConfig {
        DbConfig {
            host: self.pg_host.clone(),
            port: self.pg_port,
            database: self.pg_database.clone(),
            user: self.pg_user.clone(),
            password: self.pg_password.clone(),
        }
    }
}

pub const STORAGE_CLASS: &str = "STANDARD";

/// Provision the GCS bucket and BigQuery dataset used by the taxi warehouse.
#[derive(Parser, Debug, Clone)]
#[command(name = "gcp_setup", version)]
pub struct GcpSetupConfig {
    #[arg(long, env = "GCP_PROJECT_ID", default_value = "your-gcp-project-id")]
    pub project_id: String,

    #[arg(long, env = "GCP_DATASET", default_value = "taxi_dataset")]
    pub dataset: String,

    #[arg(long, env = "GCP_BUCKET_NAME", default_value = "your-bucket-name")]
    pub bucket: String,

    /// Shared by the bucket and the dataset, e.g. US or EU
    #[arg(long, env = "GCP_LOCATION", default_value = "US")]
    pub location: String,

    /// Seconds to wait before retrying a failed task
    #[arg(long, default_value_t = 300)]
    pub retry_delay_secs: u64,

    /// Print the task graph and exit without touching GCP
    #[arg(long)]
    pub list: bool,

    /// Write the JSON run report here
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl GcpSetupConfig {
    pub fn bucket_spec(&self) -> BucketSpec {
        BucketSpec {
            name: self.bucket.clone(),
            project_id: self.project_id.clone(),
            location: self.location.clone(),
            storage_class: STORAGE_CLASS.to_string(),
        }
    }

    pub fn dataset_spec(&self) -> DatasetSpec {
        DatasetSpec {
            dataset_id: self.dataset.clone(),
            project_id: self.project_id.clone(),
            location: self.location.clone(),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const GCP_VARS: [&str; 4] = [
        "GCP_PROJECT_ID",
        "GCP_DATASET",
        "GCP_BUCKET_NAME",
        "GCP_LOCATION",
    ];
    const PG_VARS: [&str; 5] = ["PG_HOST", "PG_PORT", "PG_DATABASE", "PG_USER", "PG_PASSWORD"];

    fn clear(vars: &[&str]) {
        for v in vars {
            env::remove_var(v);
        }
    }

    #[test]
    #[serial]
    fn gcp_defaults_to_placeholders() {
        clear(&GCP_VARS);
        let cfg = GcpSetupConfig::try_parse_from(["gcp_setup"]).unwrap();

        assert_eq!(cfg.project_id, "your-gcp-project-id");
        assert_eq!(cfg.dataset, "taxi_dataset");
        assert_eq!(cfg.bucket, "your-bucket-name");
        assert_eq!(cfg.location, "US");
        assert_eq!(cfg.retry_delay(), Duration::from_secs(300));
        assert!(!cfg.list);
        assert_eq!(cfg.bucket_spec().storage_class, "STANDARD");
    }

    #[test]
    #[serial]
    fn gcp_reads_environment() {
        clear(&GCP_VARS);
        env::set_var("GCP_PROJECT_ID", "nyc-warehouse");
        env::set_var("GCP_LOCATION", "EU");
        let cfg = GcpSetupConfig::try_parse_from(["gcp_setup"]).unwrap();
        clear(&GCP_VARS);

        let dataset = cfg.dataset_spec();
        assert_eq!(dataset.project_id, "nyc-warehouse");
        assert_eq!(dataset.location, "EU");
        assert_eq!(dataset.dataset_id, "taxi_dataset");
        assert_eq!(cfg.bucket_spec().location, "EU");
    }

    #[test]
    #[serial]
    fn flags_override_environment() {
        clear(&GCP_VARS);
        env::set_var("GCP_BUCKET_NAME", "from-env");
        let cfg = GcpSetupConfig::try_parse_from(["gcp_setup", "--bucket", "from-flag"]).unwrap();
        clear(&GCP_VARS);
        assert_eq!(cfg.bucket, "from-flag");
    }

    #[test]
    #[serial]
    fn ingest_defaults_match_local_postgres() {
        clear(&PG_VARS);
        clear(&["TRIPS_URL", "ZONES_URL", "TRIPS_TABLE", "ZONES_TABLE"]);
        let cfg = IngestConfig::try_parse_from(["taxi-pipeline"]).unwrap();

        assert_eq!(cfg.trips_url, DEFAULT_TRIPS_URL);
        assert_eq!(cfg.zones_url, DEFAULT_ZONES_URL);
        assert_eq!(cfg.trips_table, "green_taxi_trips");
        assert_eq!(cfg.zones_table, "zones");
        assert_eq!(
            cfg.db(),
            DbConfig {
                host: "localhost".to_string(),
                port: 5433,
                database: "ny_taxi".to_string(),
                user: "postgres".to_string(),
                password: "postgres".to_string(),
            }
        );
    }

    #[test]
    #[serial]
    fn bad_port_is_rejected() {
        clear(&PG_VARS);
        let err = IngestConfig::try_parse_from(["taxi-pipeline", "--pg-port", "not-a-port"]);
        assert!(err.is_err());
    }
}
