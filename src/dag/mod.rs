//! A minimal task graph: named tasks, run-after edges and per-task retry settings.

mod run;

pub use run::{DagRun, DagRunReport, RunState, TaskReport, TaskState};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Identity of the task attempt being executed.
#[derive(Clone, Debug)]
pub struct TaskContext {
    pub dag_id: String,
    pub task_id: String,
    /// 1 for the first attempt.
    pub try_number: u32,
}

/// One unit of work in a DAG.
#[async_trait]
pub trait Operator: Send + Sync {
    async fn execute(&self, ctx: &TaskContext) -> Result<()>;

    /// One line for task listings.
    fn describe(&self) -> String;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Schedule {
    /// Runs only when triggered by hand.
    Manual,
}

#[derive(Clone, Debug, Serialize)]
pub struct DefaultArgs {
    pub owner: String,
    pub depends_on_past: bool,
    pub retries: u32,
    #[serde(with = "secs")]
    pub retry_delay: Duration,
}

impl Default for DefaultArgs {
    fn default() -> Self {
        Self {
            owner: "airflow".to_string(),
            depends_on_past: false,
            retries: 0,
            retry_delay: Duration::from_secs(300),
        }
    }
}

mod secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}

pub struct Task {
    pub task_id: String,
    /// Overrides `DefaultArgs::retries` when set.
    pub retries: Option<u32>,
    pub operator: Arc<dyn Operator>,
}

pub struct Dag {
    pub dag_id: String,
    pub description: String,
    pub schedule: Schedule,
    pub start_date: Option<NaiveDate>,
    pub catchup: bool,
    pub tags: Vec<String>,
    pub default_args: DefaultArgs,
    graph: DiGraph<Task, ()>,
    index: HashMap<String, NodeIndex>,
}

impl Dag {
    pub fn new(dag_id: impl Into<String>) -> Self {
        Self {
            dag_id: dag_id.into(),
            description: String::new(),
            schedule: Schedule::Manual,
            start_date: None,
            catchup: false,
            tags: Vec::new(),
            default_args: DefaultArgs::default(),
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn start_date(mut self, start_date: NaiveDate) -> Self {
        self.start_date = Some(start_date);
        self
    }

    pub fn catchup(mut self, catchup: bool) -> Self {
        self.catchup = catchup;
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_args(mut self, default_args: DefaultArgs) -> Self {
        self.default_args = default_args;
        self
    }

    pub fn add_task(&mut self, task_id: impl Into<String>, operator: Arc<dyn Operator>) -> Result<()> {
        let task_id = task_id.into();
        if self.index.contains_key(&task_id) {
            bail!("task {} already exists in dag {}", task_id, self.dag_id);
        }
        let idx = self.graph.add_node(Task {
            task_id: task_id.clone(),
            retries: None,
            operator,
        });
        self.index.insert(task_id, idx);
        Ok(())
    }

    /// Override the retry count of a single task.
    pub fn set_retries(&mut self, task_id: &str, retries: u32) -> Result<()> {
        let idx = self.node(task_id)?;
        self.graph[idx].retries = Some(retries);
        Ok(())
    }

    /// `downstream` may only start after `upstream` succeeded.
    pub fn set_downstream(&mut self, upstream: &str, downstream: &str) -> Result<()> {
        if upstream == downstream {
            bail!("task {} cannot depend on itself", upstream);
        }
        let up = self.node(upstream)?;
        let down = self.node(downstream)?;
        self.graph.update_edge(up, down, ());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.index.get(task_id).map(|&idx| &self.graph[idx])
    }

    /// Task ids `task_id` waits on, sorted.
    pub fn upstream_of(&self, task_id: &str) -> Result<Vec<&str>> {
        let idx = self.node(task_id)?;
        let mut ids: Vec<&str> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|n| self.graph[n].task_id.as_str())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Every task, each after all of its upstream tasks. Fails if the edges form a cycle.
    pub fn execution_order(&self) -> Result<Vec<&Task>> {
        let order = toposort(&self.graph, None).map_err(|cycle| {
            anyhow!(
                "dag {} has a cycle through task {}",
                self.dag_id,
                self.graph[cycle.node_id()].task_id
            )
        })?;
        Ok(order.into_iter().map(|idx| &self.graph[idx]).collect())
    }

    pub fn retries_for(&self, task: &Task) -> u32 {
        task.retries.unwrap_or(self.default_args.retries)
    }

    fn node(&self, task_id: &str) -> Result<NodeIndex> {
        self.index
            .get(task_id)
            .copied()
            .ok_or_else(|| anyhow!("no task {} in dag {}", task_id, self.dag_id))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every attempt in a shared log and fails the first `failures` of them.
    pub(crate) struct Scripted {
        pub name: &'static str,
        pub log: Arc<Mutex<Vec<String>>>,
        pub failures: Mutex<u32>,
    }

    impl Scripted {
        pub(crate) fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>, failures: u32) -> Arc<Self> {
            Arc::new(Self {
                name,
                log: log.clone(),
                failures: Mutex::new(failures),
            })
        }
    }

    #[async_trait]
    impl Operator for Scripted {
        async fn execute(&self, ctx: &TaskContext) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}#{}", self.name, ctx.try_number));
            let mut left = self.failures.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                bail!("{} failed", self.name);
            }
            Ok(())
        }

        fn describe(&self) -> String {
            self.name.to_string()
        }
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn builder_keeps_metadata() {
        let dag = Dag::new("gcp_setup")
            .description("Configure GCP resources (Bucket and Dataset)")
            .start_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .catchup(false)
            .tags(["gcp", "setup"]);

        assert_eq!(dag.schedule, Schedule::Manual);
        assert_eq!(dag.tags, vec!["gcp".to_string(), "setup".to_string()]);
        assert!(dag.is_empty());
        assert_eq!(dag.default_args.owner, "airflow");
    }

    #[test]
    fn order_follows_edges_not_insertion() -> Result<()> {
        let log = log();
        let mut dag = Dag::new("d");
        dag.add_task("second", Scripted::new("second", &log, 0))?;
        dag.add_task("first", Scripted::new("first", &log, 0))?;
        dag.set_downstream("first", "second")?;

        let ids: Vec<&str> = dag
            .execution_order()?
            .into_iter()
            .map(|t| t.task_id.as_str())
            .collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert_eq!(dag.upstream_of("second")?, vec!["first"]);
        assert!(dag.upstream_of("first")?.is_empty());
        Ok(())
    }

    #[test]
    fn rejects_duplicates_unknown_ids_and_self_edges() -> Result<()> {
        let log = log();
        let mut dag = Dag::new("d");
        dag.add_task("a", Scripted::new("a", &log, 0))?;

        assert!(dag.add_task("a", Scripted::new("a", &log, 0)).is_err());
        assert!(dag.set_downstream("a", "missing").is_err());
        assert!(dag.set_downstream("a", "a").is_err());
        assert!(dag.set_retries("missing", 2).is_err());
        Ok(())
    }

    #[test]
    fn cycles_are_reported() -> Result<()> {
        let log = log();
        let mut dag = Dag::new("d");
        dag.add_task("a", Scripted::new("a", &log, 0))?;
        dag.add_task("b", Scripted::new("b", &log, 0))?;
        dag.set_downstream("a", "b")?;
        dag.set_downstream("b", "a")?;

        let err = dag.execution_order().err().unwrap();
        assert!(err.to_string().contains("cycle"));
        Ok(())
    }

    #[test]
    fn per_task_retries_override_defaults() -> Result<()> {
        let log = log();
        let mut dag = Dag::new("d").default_args(DefaultArgs {
            retries: 1,
            ..Default::default()
        });
        dag.add_task("a", Scripted::new("a", &log, 0))?;
        dag.add_task("b", Scripted::new("b", &log, 0))?;
        dag.set_retries("b", 3)?;

        assert_eq!(dag.retries_for(dag.task("a").unwrap()), 1);
        assert_eq!(dag.retries_for(dag.task("b").unwrap()), 3);
        Ok(())
    }
}
