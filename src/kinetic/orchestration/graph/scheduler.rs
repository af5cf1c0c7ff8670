// SPDX-License-Identifier: MIT

//! Dependency-graph execution
//!
//! A single scheduling loop owns every node state and the run context. Node
//! attempts run as tasks on a `JoinSet`; the loop promotes PENDING nodes,
//! dispatches READY ones, and settles each attempt as it finishes.

use super::builder::DependencyGraph;
use crate::adk::error::{millis, ExecutorError, NodeError, RunError};
use crate::adk::executor::{AgentExecutor, ExecutorOutput};
use crate::kinetic::orchestration::config::SchedulerConfig;
use crate::kinetic::orchestration::context::{compose_task, Context, ContextView};
use crate::kinetic::orchestration::result::{
    extract_json_path, NodeResult, NodeStatus, OrchestrationResult, RunStatus,
};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Executes a validated [`DependencyGraph`]
pub struct GraphScheduler {
    graph: DependencyGraph,
    config: SchedulerConfig,
}

impl GraphScheduler {
    pub fn new(graph: DependencyGraph, config: SchedulerConfig) -> Self {
        Self { graph, config }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run the graph to completion
    ///
    /// Never fails once started: every node failure, skip, timeout or
    /// cancellation is reported in the returned result.
    pub async fn execute(&self, task: impl Into<String>) -> OrchestrationResult {
        self.execute_with_cancel(task, CancellationToken::new()).await
    }

    /// Run the graph, stopping early when `cancel` fires
    pub async fn execute_with_cancel(
        &self,
        task: impl Into<String>,
        cancel: CancellationToken,
    ) -> OrchestrationResult {
        Run::new(&self.graph, &self.config, task.into())
            .drive(cancel)
            .await
    }
}

/// Why a node ended SKIPPED; decides whether the skip degrades the run status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipCause {
    Failure,
    Guard,
    Stopped,
}

#[derive(Debug)]
struct NodeState {
    status: NodeStatus,
    attempts: u32,
    first_started: Option<DateTime<Utc>>,
    skip_cause: Option<SkipCause>,
}

enum Readiness {
    Wait,
    Ready,
    Skip(SkipCause, NodeError),
}

enum AttemptError {
    Executor(ExecutorError),
    Timeout(Duration),
    Cancelled,
    Panicked(String),
}

struct Attempt {
    node: usize,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    outcome: Result<ExecutorOutput, AttemptError>,
}

/// State of one execution; dropped when the result is returned
struct Run<'a> {
    graph: &'a DependencyGraph,
    config: &'a SchedulerConfig,
    run_id: Uuid,
    started: Instant,
    deadline: Option<Instant>,
    context: Context,
    states: Vec<NodeState>,
    /// Cached guard outcome per guarded inbound edge, evaluated once its source completes
    guard_outcomes: Vec<Vec<Option<bool>>>,
    execution_order: Vec<String>,
    completion_order: Vec<usize>,
    terminated_by: Option<RunError>,
}

impl<'a> Run<'a> {
    fn new(graph: &'a DependencyGraph, config: &'a SchedulerConfig, task: String) -> Self {
        let states = (0..graph.len())
            .map(|_| NodeState {
                status: NodeStatus::Pending,
                attempts: 0,
                first_started: None,
                skip_cause: None,
            })
            .collect();
        let guard_outcomes = graph
            .guarded
            .iter()
            .map(|edges| vec![None; edges.len()])
            .collect();
        let started = Instant::now();

        Self {
            graph,
            config,
            run_id: Uuid::new_v4(),
            started,
            deadline: config.execution_timeout.map(|limit| started + limit),
            context: Context::new(task),
            states,
            guard_outcomes,
            execution_order: Vec::new(),
            completion_order: Vec::new(),
            terminated_by: None,
        }
    }

    async fn drive(mut self, cancel: CancellationToken) -> OrchestrationResult {
        let run_token = cancel.child_token();
        let deadline = self.deadline;
        let mut in_flight: JoinSet<Attempt> = JoinSet::new();

        log::info!(
            "Starting graph run {} with {} nodes",
            self.run_id,
            self.graph.len()
        );

        loop {
            if self.terminated_by.is_none() && run_token.is_cancelled() {
                self.stop(RunError::Cancelled, &run_token);
            }
            if self.terminated_by.is_none() {
                self.promote();
                self.dispatch(&mut in_flight, &run_token);
            }
            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                _ = run_token.cancelled(), if self.terminated_by.is_none() => {
                    self.stop(RunError::Cancelled, &run_token);
                }
                _ = wait_until(deadline), if self.terminated_by.is_none() => {
                    let limit_ms = self.config.execution_timeout.map(millis).unwrap_or(0);
                    self.stop(RunError::Timeout { limit_ms }, &run_token);
                }
                joined = in_flight.join_next() => match joined {
                    Some(Ok(attempt)) => self.settle(attempt),
                    Some(Err(e)) => log::error!("Node task ended abnormally: {}", e),
                    None => {}
                }
            }
        }

        self.finish()
    }

    fn stop(&mut self, reason: RunError, run_token: &CancellationToken) {
        log::warn!("Stopping graph run {}: {}", self.run_id, reason);
        self.terminated_by = Some(reason);
        run_token.cancel();
    }

    /// Error recorded for nodes cut short by a stop
    fn stopped_error(&self) -> NodeError {
        match self.terminated_by {
            Some(RunError::Timeout { .. }) => NodeError::RunTimedOut,
            _ => NodeError::Cancelled,
        }
    }

    /// Move PENDING nodes to READY or SKIPPED; topological order lets skips cascade in one pass
    fn promote(&mut self) {
        let graph = self.graph;
        for &idx in &graph.topo {
            if self.states[idx].status != NodeStatus::Pending {
                continue;
            }
            match self.readiness(idx) {
                Readiness::Wait => {}
                Readiness::Ready => self.transition(idx, NodeStatus::Ready),
                Readiness::Skip(cause, error) => self.skip(idx, cause, error),
            }
        }
    }

    fn readiness(&mut self, idx: usize) -> Readiness {
        let graph = self.graph;
        let mut waiting = false;

        for &dep in &graph.plain[idx] {
            let state = &self.states[dep];
            match state.status {
                NodeStatus::Completed => {}
                NodeStatus::Failed | NodeStatus::Skipped => {
                    return Readiness::Skip(
                        upstream_cause(state),
                        NodeError::SkippedDependency {
                            upstream: graph.id(dep).to_string(),
                        },
                    );
                }
                _ => waiting = true,
            }
        }
        if waiting {
            return Readiness::Wait;
        }

        let edges = &graph.guarded[idx];
        if edges.is_empty() {
            return Readiness::Ready;
        }

        let mut open = false;
        let mut failed_upstream: Option<usize> = None;
        for (k, edge) in edges.iter().enumerate() {
            let state = &self.states[edge.source];
            match state.status {
                NodeStatus::Completed => {
                    let context = &self.context;
                    let satisfied = *self.guard_outcomes[idx][k]
                        .get_or_insert_with(|| edge.guard.evaluate(context));
                    log::debug!(
                        "Guard {} -> {} evaluated to {}",
                        graph.id(edge.source),
                        graph.id(idx),
                        satisfied
                    );
                    if satisfied {
                        return Readiness::Ready;
                    }
                }
                NodeStatus::Skipped if state.skip_cause == Some(SkipCause::Guard) => {}
                NodeStatus::Failed | NodeStatus::Skipped => {
                    failed_upstream.get_or_insert(edge.source);
                }
                _ => open = true,
            }
        }

        if open {
            Readiness::Wait
        } else if let Some(upstream) = failed_upstream {
            Readiness::Skip(
                upstream_cause(&self.states[upstream]),
                NodeError::SkippedDependency {
                    upstream: graph.id(upstream).to_string(),
                },
            )
        } else {
            Readiness::Skip(SkipCause::Guard, NodeError::GuardNotSatisfied)
        }
    }

    fn transition(&mut self, idx: usize, next: NodeStatus) {
        let state = &mut self.states[idx];
        debug_assert!(
            state.status.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            state.status,
            next
        );
        state.status = next;
    }

    fn skip(&mut self, idx: usize, cause: SkipCause, error: NodeError) {
        let graph = self.graph;
        let id = graph.id(idx);
        match cause {
            SkipCause::Guard => log::info!("Skipping node '{}': {}", id, error),
            _ => log::warn!("Skipping node '{}': {}", id, error),
        }
        self.transition(idx, NodeStatus::Skipped);
        self.states[idx].skip_cause = Some(cause);
        self.record(NodeResult::skipped(id, error), Map::new());
    }

    /// Start READY nodes by descending priority, then topological position, up to the concurrency cap
    fn dispatch(&mut self, in_flight: &mut JoinSet<Attempt>, token: &CancellationToken) {
        let graph = self.graph;
        let mut ready: Vec<usize> = (0..graph.len())
            .filter(|&i| self.states[i].status == NodeStatus::Ready)
            .collect();
        ready.sort_by_key(|&i| (Reverse(graph.nodes[i].priority), graph.position[i]));

        for idx in ready {
            if let Some(cap) = self.config.max_concurrency {
                if in_flight.len() >= cap.max(1) {
                    break;
                }
            }
            self.launch(idx, in_flight, token);
        }
    }

    fn launch(&mut self, idx: usize, in_flight: &mut JoinSet<Attempt>, token: &CancellationToken) {
        let graph = self.graph;
        let node = &graph.nodes[idx];

        self.transition(idx, NodeStatus::Running);
        let state = &mut self.states[idx];
        state.attempts += 1;
        let attempt = state.attempts;
        if attempt == 1 {
            self.execution_order.push(node.id.clone());
        }

        let view = self
            .context
            .view(graph.ancestors[idx].iter().map(|&i| graph.id(i)))
            .with_cancellation(token.child_token());
        let direct: Vec<Arc<NodeResult>> = graph.parents[idx]
            .iter()
            .filter_map(|&p| {
                view.results()
                    .iter()
                    .find(|r| r.node_id == graph.id(p) && r.is_completed())
                    .cloned()
            })
            .collect();
        let task = compose_task(self.context.task(), &direct);
        let delay = if attempt > 1 {
            self.config.retry_delay
        } else {
            Duration::ZERO
        };

        log::info!("Dispatching node '{}' (attempt {})", node.id, attempt);
        in_flight.spawn(run_attempt(
            idx,
            Arc::clone(&node.executor),
            task,
            view,
            AttemptLimits {
                delay,
                timeout: self.config.node_timeout,
                grace: self.config.cancel_grace(),
                deadline: self.deadline,
            },
            token.clone(),
        ));
    }

    fn settle(&mut self, attempt: Attempt) {
        let graph = self.graph;
        let idx = attempt.node;
        let node = &graph.nodes[idx];
        let first_started = *self.states[idx]
            .first_started
            .get_or_insert(attempt.started_at);
        let retries = self.states[idx].attempts.saturating_sub(1);

        let (error, retryable) = match attempt.outcome {
            Ok(ExecutorOutput::Final(payload)) => {
                let extracted = extract_outputs(&node.id, &node.outputs, &payload);
                let result = NodeResult::completed(&node.id, payload)
                    .with_timing(first_started, attempt.finished_at)
                    .with_retries(retries);
                log::info!("Node '{}' completed in {}ms", node.id, result.elapsed_ms);
                self.transition(idx, NodeStatus::Completed);
                self.record(result, extracted);
                self.completion_order.push(idx);
                return;
            }
            Ok(ExecutorOutput::Handoff(handoff)) => (
                NodeError::UnexpectedHandoff {
                    target: handoff.target,
                },
                false,
            ),
            Err(AttemptError::Executor(e)) => {
                let retryable = e.is_retryable();
                (
                    NodeError::Executor {
                        message: e.to_string(),
                    },
                    retryable,
                )
            }
            Err(AttemptError::Panicked(message)) => (
                NodeError::Executor {
                    message: format!("executor panicked: {}", message),
                },
                true,
            ),
            Err(AttemptError::Timeout(limit)) => (
                NodeError::Timeout {
                    timeout_ms: millis(limit),
                },
                true,
            ),
            Err(AttemptError::Cancelled) => (self.stopped_error(), false),
        };

        self.transition(idx, NodeStatus::Failed);
        let max_retries = node.max_retries.unwrap_or(self.config.max_retries);
        if retryable && self.terminated_by.is_none() && retries < max_retries {
            log::warn!(
                "Node '{}' failed on attempt {} of {}: {}",
                node.id,
                retries + 1,
                max_retries + 1,
                error
            );
            self.transition(idx, NodeStatus::Pending);
            return;
        }

        log::error!(
            "Node '{}' failed after {} attempt(s): {}",
            node.id,
            retries + 1,
            error
        );
        let result = NodeResult::failed(&node.id, error)
            .with_timing(first_started, attempt.finished_at)
            .with_retries(retries);
        self.record(result, Map::new());
    }

    fn record(&mut self, result: NodeResult, extracted: Map<String, Value>) {
        if let Err(e) = self.context.record_with_state(result, extracted) {
            log::error!("Graph run {}: {}", self.run_id, e);
        }
    }

    fn finish(mut self) -> OrchestrationResult {
        let graph = self.graph;

        for &idx in &graph.topo {
            match self.states[idx].status {
                NodeStatus::Pending | NodeStatus::Ready => {
                    let error = self.stopped_error();
                    self.states[idx].status = NodeStatus::Skipped;
                    self.states[idx].skip_cause = Some(SkipCause::Stopped);
                    self.record(NodeResult::skipped(graph.id(idx), error), Map::new());
                }
                NodeStatus::Running => {
                    self.states[idx].status = NodeStatus::Failed;
                    let error = NodeError::Executor {
                        message: "node task ended without a result".to_string(),
                    };
                    self.record(NodeResult::failed(graph.id(idx), error), Map::new());
                }
                _ => {}
            }
        }

        let status = self.run_status();
        let final_idx = self
            .completion_order
            .iter()
            .rev()
            .find(|i| graph.sinks.contains(i))
            .or_else(|| self.completion_order.last())
            .copied();
        let final_node = final_idx.map(|i| graph.id(i).to_string());
        let final_output = final_node
            .as_deref()
            .and_then(|id| self.context.get(id))
            .and_then(|r| r.output.clone());

        let node_results: BTreeMap<String, NodeResult> = self
            .context
            .iter()
            .map(|r| (r.node_id.clone(), NodeResult::clone(r)))
            .collect();
        let total_elapsed_ms = millis(self.started.elapsed());

        log::info!(
            "Graph run {} finished with status {:?} in {}ms",
            self.run_id,
            status,
            total_elapsed_ms
        );

        OrchestrationResult {
            run_id: self.run_id,
            status,
            execution_order: self.execution_order,
            node_results,
            invocations: Vec::new(),
            total_elapsed_ms,
            final_node,
            final_output,
            terminated_by: self.terminated_by,
        }
    }

    fn run_status(&self) -> RunStatus {
        match &self.terminated_by {
            Some(RunError::Cancelled) => return RunStatus::Cancelled,
            Some(_) if self.completion_order.is_empty() => return RunStatus::Failed,
            Some(_) => return RunStatus::Partial,
            None => {}
        }

        let degraded = |state: &NodeState| {
            state.status == NodeStatus::Failed
                || (state.status == NodeStatus::Skipped
                    && state.skip_cause == Some(SkipCause::Failure))
        };
        let sink_failed = self
            .graph
            .sinks
            .iter()
            .any(|&i| degraded(&self.states[i]));
        let sink_completed = self
            .graph
            .sinks
            .iter()
            .any(|&i| self.states[i].status == NodeStatus::Completed);

        if sink_failed || !sink_completed {
            RunStatus::Failed
        } else if self.states.iter().any(degraded) {
            RunStatus::Partial
        } else {
            RunStatus::Completed
        }
    }
}

fn upstream_cause(state: &NodeState) -> SkipCause {
    match state.status {
        NodeStatus::Skipped => state.skip_cause.unwrap_or(SkipCause::Failure),
        _ => SkipCause::Failure,
    }
}

/// Copy output values into named state keys
fn extract_outputs(node_id: &str, mappings: &[(String, String)], payload: &Value) -> Map<String, Value> {
    let mut extracted = Map::new();
    for (key, path) in mappings {
        match extract_json_path(payload, path) {
            Some(value) => {
                extracted.insert(key.clone(), value);
            }
            None => log::warn!(
                "Node '{}' output has no value at '{}' for state key '{}'",
                node_id,
                path,
                key
            ),
        }
    }
    extracted
}

struct AttemptLimits {
    delay: Duration,
    timeout: Option<Duration>,
    grace: Duration,
    /// Run deadline; the grace period never extends past it
    deadline: Option<Instant>,
}

/// One invocation, bounded by the node timeout and the cancellation grace period
async fn run_attempt(
    node: usize,
    executor: Arc<dyn AgentExecutor>,
    task: String,
    view: ContextView,
    limits: AttemptLimits,
    cancel: CancellationToken,
) -> Attempt {
    if !limits.delay.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(limits.delay) => {}
            _ = cancel.cancelled() => {
                let now = Utc::now();
                return Attempt {
                    node,
                    started_at: now,
                    finished_at: now,
                    outcome: Err(AttemptError::Cancelled),
                };
            }
        }
    }

    let started_at = Utc::now();
    let call = async {
        let invocation = AssertUnwindSafe(executor.invoke(task, view)).catch_unwind();
        let outcome = match limits.timeout {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(AttemptError::Timeout(limit)),
            },
            None => invocation.await,
        };
        match outcome {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(ExecutorError::Cancelled)) => Err(AttemptError::Cancelled),
            Ok(Err(e)) => Err(AttemptError::Executor(e)),
            Err(panic) => Err(AttemptError::Panicked(panic_message(panic))),
        }
    };
    tokio::pin!(call);

    let outcome = tokio::select! {
        biased;
        outcome = &mut call => outcome,
        _ = cancel.cancelled() => {
            let grace_end = Instant::now() + limits.grace;
            let grace_end = limits.deadline.map_or(grace_end, |d| d.min(grace_end));
            match tokio::time::timeout_at(grace_end, &mut call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(AttemptError::Cancelled),
            }
        }
    };

    Attempt {
        node,
        started_at,
        finished_at: Utc::now(),
        outcome,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => futures::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::executor::FnExecutor;
    use crate::kinetic::orchestration::graph::{Guard, NodeSpec};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn constant(name: &str, value: Value) -> Arc<dyn AgentExecutor> {
        Arc::new(FnExecutor::new(name, move |_task, _ctx| {
            let value = value.clone();
            async move { Ok(ExecutorOutput::Final(value)) }
        }))
    }

    fn failing(name: &str, calls: Arc<AtomicU32>) -> Arc<dyn AgentExecutor> {
        Arc::new(FnExecutor::new(name, move |_task, _ctx| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err::<ExecutorOutput, _>(ExecutorError::failed("boom")) }
        }))
    }

    fn none() -> Vec<&'static str> {
        Vec::new()
    }

    #[tokio::test]
    async fn test_failure_skips_dependents_but_not_siblings() {
        let calls = Arc::new(AtomicU32::new(0));
        let graph = DependencyGraph::builder()
            .add_node("root", constant("root", json!("r")), none())
            .add_node("bad", failing("bad", calls.clone()), ["root"])
            .add_node("after_bad", constant("after_bad", json!("x")), ["bad"])
            .add_node("good", constant("good", json!("g")), ["root"])
            .build()
            .unwrap();

        let result = GraphScheduler::new(graph, SchedulerConfig::default())
            .execute("go")
            .await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.result("bad").unwrap().status, NodeStatus::Failed);
        assert_eq!(
            result.result("after_bad").unwrap().error,
            Some(NodeError::SkippedDependency {
                upstream: "bad".into()
            })
        );
        assert_eq!(result.result("good").unwrap().status, NodeStatus::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!result.execution_order.contains(&"after_bad".to_string()));
    }

    #[tokio::test]
    async fn test_failure_off_the_sink_path_is_partial() {
        let calls = Arc::new(AtomicU32::new(0));
        let graph = DependencyGraph::builder()
            .add_node("root", constant("root", json!("r")), none())
            .add_node("side", failing("side", calls), ["root"])
            .add_node("report", constant("report", json!("done")), ["root"])
            .set_sinks(["report"])
            .build()
            .unwrap();

        let result = GraphScheduler::new(graph, SchedulerConfig::default())
            .execute("go")
            .await;

        assert_eq!(result.status, RunStatus::Partial);
        assert_eq!(result.final_node.as_deref(), Some("report"));
        assert_eq!(result.final_text().as_deref(), Some("done"));
        assert_eq!(result.failed_nodes(), vec!["side"]);
    }

    #[tokio::test]
    async fn test_handoff_in_graph_mode_fails_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let exec: Arc<dyn AgentExecutor> = Arc::new(FnExecutor::new("h", move |_t, _c| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(ExecutorOutput::handoff("elsewhere", "please")) }
        }));
        let graph = DependencyGraph::builder()
            .node(NodeSpec::new("h", exec).max_retries(3))
            .build()
            .unwrap();

        let result = GraphScheduler::new(graph, SchedulerConfig::default())
            .execute("go")
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            result.result("h").unwrap().error,
            Some(NodeError::UnexpectedHandoff {
                target: "elsewhere".into()
            })
        );
        assert_eq!(result.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_priority_orders_ready_nodes_under_concurrency_cap() {
        let graph = DependencyGraph::builder()
            .node(NodeSpec::new("low", constant("low", json!(1))))
            .node(NodeSpec::new("high", constant("high", json!(2))).priority(10))
            .node(NodeSpec::new("mid", constant("mid", json!(3))).priority(5))
            .build()
            .unwrap();
        let config = SchedulerConfig {
            max_concurrency: Some(1),
            ..Default::default()
        };

        let result = GraphScheduler::new(graph, config).execute("go").await;

        assert_eq!(result.execution_order, vec!["high", "mid", "low"]);
        assert_eq!(result.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_output_mapping_feeds_guards() {
        let graph = DependencyGraph::builder()
            .node(
                NodeSpec::new(
                    "classify",
                    constant("classify", json!({"intent": "bug", "confidence": 0.9})),
                )
                .output("intent", "intent"),
            )
            .add_node("fix", constant("fix", json!("patched")), none())
            .add_node("plan", constant("plan", json!("roadmap")), none())
            .add_edge("classify", "fix", Some(Guard::expr("intent == 'bug'")))
            .add_edge("classify", "plan", Some(Guard::expr("intent == 'feature'")))
            .build()
            .unwrap();

        let result = GraphScheduler::new(graph, SchedulerConfig::default())
            .execute("triage")
            .await;

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.result("fix").unwrap().status, NodeStatus::Completed);
        assert_eq!(
            result.result("plan").unwrap().error,
            Some(NodeError::GuardNotSatisfied)
        );
        assert_eq!(result.final_node.as_deref(), Some("fix"));
    }

    #[tokio::test]
    async fn test_panicking_executor_is_a_node_failure() {
        let exec: Arc<dyn AgentExecutor> = Arc::new(FnExecutor::new("p", |_t, _c| async move {
            if true {
                panic!("kaboom");
            }
            Ok(ExecutorOutput::text("unreachable"))
        }));
        let graph = DependencyGraph::builder()
            .add_node("p", exec, none())
            .build()
            .unwrap();

        let result = GraphScheduler::new(graph, SchedulerConfig::default())
            .execute("go")
            .await;

        match &result.result("p").unwrap().error {
            Some(NodeError::Executor { message }) => assert!(message.contains("kaboom")),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(result.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_node_timeout_is_retried_then_recorded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let exec: Arc<dyn AgentExecutor> = Arc::new(FnExecutor::new("slow", move |_t, _c| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(ExecutorOutput::text("late"))
            }
        }));
        let graph = DependencyGraph::builder()
            .node(NodeSpec::new("slow", exec).max_retries(1))
            .build()
            .unwrap();
        let config = SchedulerConfig {
            node_timeout: Some(Duration::from_millis(30)),
            ..Default::default()
        };

        let result = GraphScheduler::new(graph, config).execute("go").await;
        let node = result.result("slow").unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(node.retries, 1);
        assert_eq!(node.error, Some(NodeError::Timeout { timeout_ms: 30 }));
    }

    #[tokio::test]
    async fn test_execution_timeout_does_not_wait_out_the_grace() {
        let exec: Arc<dyn AgentExecutor> = Arc::new(FnExecutor::new("stuck", |_t, _c| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ExecutorOutput::text("never"))
        }));
        let graph = DependencyGraph::builder()
            .add_node("stuck", exec, none())
            .build()
            .unwrap();
        let config = SchedulerConfig {
            execution_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };

        let started = std::time::Instant::now();
        let result = GraphScheduler::new(graph, config).execute("go").await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.terminated_by, Some(RunError::Timeout { limit_ms: 50 }));
        assert_eq!(result.result("stuck").unwrap().error, Some(NodeError::RunTimedOut));
    }

    #[tokio::test]
    async fn test_executor_observes_cancellation() {
        let exec: Arc<dyn AgentExecutor> = Arc::new(FnExecutor::new("waiter", |_t, ctx: ContextView| async move {
            ctx.cancellation().cancelled().await;
            Err::<ExecutorOutput, _>(ExecutorError::Cancelled)
        }));
        let graph = DependencyGraph::builder()
            .add_node("waiter", exec, none())
            .build()
            .unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = GraphScheduler::new(graph, SchedulerConfig::default())
            .execute_with_cancel("go", cancel)
            .await;

        // Default grace is 5s; returning early means the token reached the executor
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(result.status, RunStatus::Cancelled);
        assert_eq!(result.result("waiter").unwrap().error, Some(NodeError::Cancelled));
    }

    #[tokio::test]
    async fn test_dependency_output_is_composed_into_task() {
        let exec: Arc<dyn AgentExecutor> = Arc::new(FnExecutor::new("echo", |task: String, ctx: ContextView| async move {
            Ok(ExecutorOutput::Final(json!({
                "task": task,
                "visible": ctx.results().len(),
            })))
        }));
        let graph = DependencyGraph::builder()
            .add_node("a", constant("a", json!("alpha")), none())
            .add_node("b", constant("b", json!("beta")), ["a"])
            .add_node("echo", exec, ["b"])
            .build()
            .unwrap();

        let result = GraphScheduler::new(graph, SchedulerConfig::default())
            .execute("base")
            .await;
        let output = result.final_output.unwrap();

        assert_eq!(output["task"], "base\n\n--- Output of b ---\nbeta");
        assert_eq!(output["visible"], 2);
    }
}
