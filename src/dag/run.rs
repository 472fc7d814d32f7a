use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::{Dag, TaskContext};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Success,
    Failed,
    /// Never started because an upstream task did not succeed.
    UpstreamFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Success,
    Failed,
}

#[derive(Clone, Debug, Serialize)]
pub struct TaskReport {
    pub task_id: String,
    pub state: TaskState,
    /// Attempts made; 0 when the task never started.
    pub tries: u32,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DagRunReport {
    pub dag_id: String,
    pub run_id: String,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tasks: Vec<TaskReport>,
}

impl DagRunReport {
    pub fn task(&self, task_id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serializing run report")?;
        fs::write(path, json).with_context(|| format!("writing run report {}", path.display()))
    }
}

/// A single manually triggered run of a DAG.
pub struct DagRun {
    run_id: String,
}

impl DagRun {
    pub fn manual() -> Self {
        Self {
            run_id: format!("manual__{}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f%:z")),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Execute every task of `dag` one at a time in dependency order.
    ///
    /// Only a cyclic graph is an `Err`; task failures are reported in the returned report.
    pub async fn execute(&self, dag: &Dag) -> Result<DagRunReport> {
        let order = dag.execution_order()?;
        let started_at = Utc::now();
        info!(dag = %dag.dag_id, run = %self.run_id, tasks = order.len(), "dag run started");

        let mut states: HashMap<&str, TaskState> = HashMap::new();
        let mut reports = Vec::with_capacity(order.len());

        for task in order {
            let upstream = dag.upstream_of(&task.task_id)?;
            let blocked = upstream
                .iter()
                .find(|id| states.get(**id) != Some(&TaskState::Success));
            if let Some(blocker) = blocked {
                warn!(task = %task.task_id, upstream = %blocker, "upstream did not succeed; skipping");
                states.insert(&task.task_id, TaskState::UpstreamFailed);
                reports.push(TaskReport {
                    task_id: task.task_id.clone(),
                    state: TaskState::UpstreamFailed,
                    tries: 0,
                    error: None,
                });
                continue;
            }

            let max_tries = dag.retries_for(task).saturating_add(1);
            let mut try_number = 0;
            let mut last_error = None;
            let state = loop {
                try_number += 1;
                let ctx = TaskContext {
                    dag_id: dag.dag_id.clone(),
                    task_id: task.task_id.clone(),
                    try_number,
                };
                info!(task = %task.task_id, try_number, max_tries, "task started");
                match task.operator.execute(&ctx).await {
                    Ok(()) => {
                        info!(task = %task.task_id, try_number, "task succeeded");
                        last_error = None;
                        break TaskState::Success;
                    }
                    Err(e) if try_number < max_tries => {
                        warn!(
                            task = %task.task_id,
                            try_number,
                            delay = ?dag.default_args.retry_delay,
                            error = %format!("{:#}", e),
                            "task failed; retrying"
                        );
                        last_error = Some(format!("{:#}", e));
                        sleep(dag.default_args.retry_delay).await;
                    }
                    Err(e) => {
                        error!(task = %task.task_id, try_number, error = %format!("{:#}", e), "task failed");
                        last_error = Some(format!("{:#}", e));
                        break TaskState::Failed;
                    }
                }
            };

            states.insert(&task.task_id, state);
            reports.push(TaskReport {
                task_id: task.task_id.clone(),
                state,
                tries: try_number,
                error: last_error,
            });
        }

        let state = if reports.iter().all(|r| r.state == TaskState::Success) {
            RunState::Success
        } else {
            RunState::Failed
        };
        info!(dag = %dag.dag_id, run = %self.run_id, ?state, "dag run finished");

        Ok(DagRunReport {
            dag_id: dag.dag_id.clone(),
            run_id: self.run_id.clone(),
            state,
            started_at,
            finished_at: Utc::now(),
            tasks: reports,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::tests::Scripted;
    use crate::dag::DefaultArgs;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn two_step(log: &Arc<Mutex<Vec<String>>>, bucket_failures: u32, dataset_failures: u32) -> Dag {
        let mut dag = Dag::new("gcp_setup").default_args(DefaultArgs {
            retries: 1,
            retry_delay: Duration::ZERO,
            ..Default::default()
        });
        dag.add_task("create_gcs_bucket", Scripted::new("bucket", log, bucket_failures))
            .unwrap();
        dag.add_task("create_bq_dataset", Scripted::new("dataset", log, dataset_failures))
            .unwrap();
        dag.set_downstream("create_gcs_bucket", "create_bq_dataset")
            .unwrap();
        dag
    }

    fn entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn happy_path_runs_in_order() -> Result<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dag = two_step(&log, 0, 0);

        let report = DagRun::manual().execute(&dag).await?;

        assert_eq!(report.state, RunState::Success);
        assert_eq!(entries(&log), vec!["bucket#1", "dataset#1"]);
        assert_eq!(report.task("create_bq_dataset").unwrap().tries, 1);
        Ok(())
    }

    #[tokio::test]
    async fn one_failure_is_absorbed_by_the_retry() -> Result<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dag = two_step(&log, 1, 0);

        let report = DagRun::manual().execute(&dag).await?;

        assert_eq!(report.state, RunState::Success);
        // the dataset step only starts once the bucket step has succeeded
        assert_eq!(entries(&log), vec!["bucket#1", "bucket#2", "dataset#1"]);
        let bucket = report.task("create_gcs_bucket").unwrap();
        assert_eq!(bucket.tries, 2);
        assert_eq!(bucket.state, TaskState::Success);
        assert!(bucket.error.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn failed_upstream_never_runs_downstream() -> Result<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dag = two_step(&log, 2, 0);

        let report = DagRun::manual().execute(&dag).await?;

        assert_eq!(report.state, RunState::Failed);
        assert_eq!(entries(&log), vec!["bucket#1", "bucket#2"]);

        let bucket = report.task("create_gcs_bucket").unwrap();
        assert_eq!(bucket.state, TaskState::Failed);
        assert_eq!(bucket.error.as_deref(), Some("bucket failed"));

        let dataset = report.task("create_bq_dataset").unwrap();
        assert_eq!(dataset.state, TaskState::UpstreamFailed);
        assert_eq!(dataset.tries, 0);
        Ok(())
    }

    #[tokio::test]
    async fn retries_are_bounded() -> Result<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dag = two_step(&log, 0, 5);

        let report = DagRun::manual().execute(&dag).await?;

        assert_eq!(report.state, RunState::Failed);
        assert_eq!(
            entries(&log),
            vec!["bucket#1", "dataset#1", "dataset#2"]
        );
        Ok(())
    }

    /// Keeps the context of every attempt it sees.
    struct Recorder {
        seen: Mutex<Vec<TaskContext>>,
    }

    #[async_trait::async_trait]
    impl crate::dag::Operator for Recorder {
        async fn execute(&self, ctx: &TaskContext) -> Result<()> {
            self.seen.lock().unwrap().push(ctx.clone());
            Ok(())
        }

        fn describe(&self) -> String {
            "recorder".to_string()
        }
    }

    #[tokio::test]
    async fn context_identifies_dag_task_and_attempt() -> Result<()> {
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let mut dag = Dag::new("07_gcp_setup");
        dag.add_task("create_gcs_bucket", recorder.clone())?;

        DagRun::manual().execute(&dag).await?;

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].dag_id, "07_gcp_setup");
        assert_eq!(seen[0].task_id, "create_gcs_bucket");
        assert_eq!(seen[0].try_number, 1);
        Ok(())
    }

    #[tokio::test]
    async fn unbounded_retry_count_does_not_overflow() -> Result<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dag = two_step(&log, 0, 1);
        dag.set_retries("create_bq_dataset", u32::MAX)?;

        let report = DagRun::manual().execute(&dag).await?;

        assert_eq!(report.state, RunState::Success);
        assert_eq!(report.task("create_bq_dataset").unwrap().tries, 2);
        Ok(())
    }

    #[tokio::test]
    async fn report_serializes_states_in_snake_case() -> Result<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dag = two_step(&log, 2, 0);
        let run = DagRun::manual();
        assert!(run.run_id().starts_with("manual__"));

        let report = run.execute(&dag).await?;
        let json = serde_json::to_value(&report)?;

        assert_eq!(json["state"], "failed");
        assert_eq!(json["tasks"][1]["state"], "upstream_failed");
        assert_eq!(json["dag_id"], "gcp_setup");
        Ok(())
    }

    #[tokio::test]
    async fn report_is_written_as_json() -> Result<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let report = DagRun::manual().execute(&two_step(&log, 0, 0)).await?;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("run.json");
        report.write_json(&path)?;

        let back: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(back["state"], "success");
        assert_eq!(back["tasks"].as_array().map(Vec::len), Some(2));
        Ok(())
    }
}
