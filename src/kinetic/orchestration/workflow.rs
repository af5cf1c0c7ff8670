// SPDX-License-Identifier: MIT

//! Linear and simply-branching pipelines
//!
//! A convenience layer over [`GraphScheduler`]: tasks declare predecessor
//! lists instead of edges, and there are no guards. Context propagation and
//! retry semantics are those of graph mode.

use crate::adk::error::GraphError;
use crate::adk::executor::AgentExecutor;
use crate::kinetic::orchestration::config::SchedulerConfig;
use crate::kinetic::orchestration::graph::{DependencyGraph, GraphScheduler, NodeSpec};
use crate::kinetic::orchestration::result::OrchestrationResult;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One unit of a workflow
#[derive(Clone)]
pub struct Task {
    id: String,
    executor: Arc<dyn AgentExecutor>,
    after: Vec<String>,
    priority: i32,
    max_retries: Option<u32>,
    outputs: Vec<(String, String)>,
}

impl Task {
    pub fn new(id: impl Into<String>, executor: Arc<dyn AgentExecutor>) -> Self {
        Self {
            id: id.into(),
            executor,
            after: Vec::new(),
            priority: 0,
            max_retries: None,
            outputs: Vec::new(),
        }
    }

    /// Predecessors that must complete first
    pub fn after<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn output(mut self, state_key: impl Into<String>, path: impl Into<String>) -> Self {
        self.outputs.push((state_key.into(), path.into()));
        self
    }

    fn into_spec(self) -> NodeSpec {
        let mut spec = NodeSpec::new(self.id, self.executor)
            .depends_on(self.after)
            .priority(self.priority);
        if let Some(retries) = self.max_retries {
            spec = spec.max_retries(retries);
        }
        for (key, path) in self.outputs {
            spec = spec.output(key, path);
        }
        spec
    }
}

/// Builder for [`WorkflowScheduler`]
#[derive(Default)]
pub struct WorkflowBuilder {
    tasks: Vec<Task>,
    config: SchedulerConfig,
}

impl WorkflowBuilder {
    /// Append a task that runs after the previously added one
    pub fn step(self, id: impl Into<String>, executor: Arc<dyn AgentExecutor>) -> Self {
        let task = Task::new(id, executor);
        let task = match self.tasks.last() {
            Some(previous) => task.after([previous.id.clone()]),
            None => task,
        };
        self.task(task)
    }

    /// Add a task with an explicit predecessor list
    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<WorkflowScheduler, GraphError> {
        let graph = self
            .tasks
            .into_iter()
            .fold(DependencyGraph::builder(), |builder, task| {
                builder.node(task.into_spec())
            })
            .build()?;
        Ok(WorkflowScheduler {
            inner: GraphScheduler::new(graph, self.config),
        })
    }
}

/// Pipeline scheduler built from tasks and predecessor lists
pub struct WorkflowScheduler {
    inner: GraphScheduler,
}

impl WorkflowScheduler {
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::default()
    }

    pub fn graph(&self) -> &DependencyGraph {
        self.inner.graph()
    }

    pub async fn execute(&self, task: impl Into<String>) -> OrchestrationResult {
        self.inner.execute(task).await
    }

    pub async fn execute_with_cancel(
        &self,
        task: impl Into<String>,
        cancel: CancellationToken,
    ) -> OrchestrationResult {
        self.inner.execute_with_cancel(task, cancel).await
    }
}
