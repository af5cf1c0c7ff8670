// SPDX-License-Identifier: MIT

//! Autonomous handoff orchestration
//!
//! There is no declared graph: the entry executor runs first and any executor
//! may hand control to a named peer instead of answering. Every invocation is
//! appended to a shared log that all members can read. The coordinator runs
//! one invocation at a time, so a handoff can never re-enter a running node,
//! and it enforces every bound in [`SwarmConfig`].

use crate::adk::error::{millis, ExecutorError, NodeError, RunError};
use crate::adk::executor::{AgentExecutor, ExecutorOutput, Handoff};
use crate::kinetic::orchestration::config::{SwarmConfig, DEFAULT_CANCEL_GRACE};
use crate::kinetic::orchestration::context::{ContextView, HandoffMessage, PeerInfo, SharedLog};
use crate::kinetic::orchestration::result::{
    HandoffRecord, NodeResult, OrchestrationResult, RunStatus,
};
use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Coordinates a set of named executors that hand off to one another
pub struct SwarmCoordinator {
    config: SwarmConfig,
    members: Vec<Arc<dyn AgentExecutor>>,
    index: HashMap<String, usize>,
    entry_point: Option<String>,
}

enum Outcome {
    Output(ExecutorOutput),
    /// Executor error or panic, with whether a retry may help
    Failed(String, bool),
    /// A bound or cancellation ended the invocation
    Stopped(RunError, NodeError),
}

impl SwarmCoordinator {
    pub fn new(config: SwarmConfig) -> Self {
        Self {
            config,
            members: Vec::new(),
            index: HashMap::new(),
            entry_point: None,
        }
    }

    /// Add a member, keyed by its executor name; a repeated name replaces the earlier member
    pub fn add_executor(mut self, executor: Arc<dyn AgentExecutor>) -> Self {
        let name = executor.name().to_string();
        match self.index.get(&name) {
            Some(&idx) => {
                log::warn!("Swarm member '{}' replaced", name);
                self.members[idx] = executor;
            }
            None => {
                self.index.insert(name, self.members.len());
                self.members.push(executor);
            }
        }
        self
    }

    /// First member to run; defaults to the first one added
    pub fn with_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = Some(name.into());
        self
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Member names in insertion order
    pub fn members(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name()).collect()
    }

    pub async fn execute(&self, task: impl Into<String>) -> OrchestrationResult {
        self.execute_with_cancel(task, CancellationToken::new())
            .await
    }

    pub async fn execute_with_cancel(
        &self,
        task: impl Into<String>,
        cancel: CancellationToken,
    ) -> OrchestrationResult {
        let task = task.into();
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let deadline = started + self.config.execution_timeout;
        let shared = SharedLog::new();

        let mut execution_order: Vec<String> = Vec::new();
        let mut handoff_targets: Vec<String> = Vec::new();
        let mut handoffs: u32 = 0;
        let mut iterations: u32 = 0;
        let mut incoming: Option<HandoffMessage> = None;
        let mut best_effort: Option<(String, String)> = None;
        let mut final_result: Option<(String, Value)> = None;
        let mut terminated_by: Option<RunError> = None;

        let entry = self
            .entry_point
            .clone()
            .or_else(|| self.members.first().map(|m| m.name().to_string()))
            .unwrap_or_default();
        let mut current = match self.index.get(&entry) {
            Some(&idx) => idx,
            None => {
                log::error!("Swarm entry point '{}' is not a member", entry);
                let error = RunError::NodeFailed {
                    node: entry,
                    message: "entry point is not a member of this swarm".to_string(),
                };
                return self.report(run_id, started, &shared, execution_order, None, Some(error))
                    .await;
            }
        };

        log::info!(
            "Starting swarm run {} at '{}' with {} members",
            run_id,
            entry,
            self.members.len()
        );

        loop {
            if cancel.is_cancelled() {
                terminated_by = Some(RunError::Cancelled);
                break;
            }
            if iterations >= self.config.max_iterations {
                terminated_by = Some(RunError::MaxIterationsExceeded {
                    limit: self.config.max_iterations,
                });
                break;
            }
            if Instant::now() >= deadline {
                terminated_by = Some(RunError::Timeout {
                    limit_ms: millis(self.config.execution_timeout),
                });
                break;
            }
            iterations += 1;

            let member = &self.members[current];
            let name = member.name().to_string();
            execution_order.push(name.clone());

            let node_task = match &incoming {
                Some(h) => format!(
                    "{}\n\n--- Handoff from {} ---\n{}",
                    task, h.from, h.message
                ),
                None => task.clone(),
            };

            let mut retries = 0;
            let (outcome, started_at, finished_at) = loop {
                let view = ContextView::new(task.clone())
                    .with_results(shared.snapshot().await)
                    .with_state(shared.state().await)
                    .with_handoff(incoming.clone())
                    .with_peers(self.peers_of(current))
                    .with_cancellation(cancel.child_token());
                let started_at = Utc::now();
                log::info!("Invoking swarm member '{}' (iteration {})", name, iterations);
                let outcome = self
                    .invoke_member(member, node_task.clone(), view, deadline, &cancel)
                    .await;
                let finished_at = Utc::now();

                if let Outcome::Failed(message, true) = &outcome {
                    if retries < self.config.max_retries && !cancel.is_cancelled() {
                        retries += 1;
                        log::warn!(
                            "Swarm member '{}' failed, retry {} of {}: {}",
                            name,
                            retries,
                            self.config.max_retries,
                            message
                        );
                        continue;
                    }
                }
                break (outcome, started_at, finished_at);
            };

            let timed = |result: NodeResult| {
                result
                    .with_timing(started_at, finished_at)
                    .with_retries(retries)
            };

            match outcome {
                Outcome::Output(ExecutorOutput::Final(payload)) => {
                    log::info!("Swarm member '{}' returned a final result", name);
                    shared.append(timed(NodeResult::completed(&name, payload.clone())))
                        .await;
                    final_result = Some((name, payload));
                    if cancel.is_cancelled() {
                        terminated_by = Some(RunError::Cancelled);
                    }
                    break;
                }
                Outcome::Output(ExecutorOutput::Handoff(handoff)) => {
                    shared.append(timed(handoff_record(&name, &handoff))).await;

                    if let Some(error) = self.check_handoff(&name, &handoff, handoffs) {
                        terminated_by = Some(error);
                        break;
                    }
                    if cancel.is_cancelled() {
                        terminated_by = Some(RunError::Cancelled);
                        break;
                    }
                    // The target would need another invocation; the handoff is logged but not applied
                    if iterations >= self.config.max_iterations {
                        terminated_by = Some(RunError::MaxIterationsExceeded {
                            limit: self.config.max_iterations,
                        });
                        if !handoff.message.is_empty() {
                            best_effort = Some((name, handoff.message));
                        }
                        break;
                    }

                    handoffs += 1;
                    handoff_targets.push(handoff.target.clone());
                    shared.merge_patch(&handoff.context_patch).await;
                    log::info!(
                        "Handoff {} from '{}' to '{}'",
                        handoffs,
                        name,
                        handoff.target
                    );

                    if let Some(error) = self.check_repetition(&handoff_targets) {
                        terminated_by = Some(error);
                        if !handoff.message.is_empty() {
                            best_effort = Some((name, handoff.message));
                        }
                        break;
                    }

                    if !handoff.message.is_empty() {
                        best_effort = Some((name.clone(), handoff.message.clone()));
                    }
                    current = self.index.get(&handoff.target).copied().unwrap_or(current);
                    incoming = Some(HandoffMessage {
                        from: name,
                        message: handoff.message,
                    });
                }
                Outcome::Failed(message, _) => {
                    log::error!("Swarm member '{}' failed: {}", name, message);
                    shared.append(timed(NodeResult::failed(
                        &name,
                        NodeError::Executor {
                            message: message.clone(),
                        },
                    )))
                    .await;
                    terminated_by = Some(RunError::NodeFailed {
                        node: name,
                        message,
                    });
                    break;
                }
                Outcome::Stopped(run_error, node_error) => {
                    shared.append(timed(NodeResult::failed(&name, node_error))).await;
                    terminated_by = Some(run_error);
                    break;
                }
            }
        }

        if let Some(error) = &terminated_by {
            log::warn!("Swarm run {} stopped: {}", run_id, error);
        }

        let output = match (&terminated_by, final_result) {
            (None, Some(result)) => Some(result),
            (Some(RunError::Cancelled), Some(result)) => Some(result),
            (Some(error), _) if error.is_safety_bound() => {
                best_effort.map(|(node, message)| (node, Value::String(message)))
            }
            _ => None,
        };

        self.report(run_id, started, &shared, execution_order, output, terminated_by)
            .await
    }

    fn peers_of(&self, current: usize) -> Vec<PeerInfo> {
        self.members
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != current)
            .map(|(_, m)| PeerInfo {
                name: m.name().to_string(),
                description: m.description().to_string(),
            })
            .collect()
    }

    /// One invocation bounded by the per-node timeout, the run deadline and cancellation
    async fn invoke_member(
        &self,
        member: &Arc<dyn AgentExecutor>,
        task: String,
        view: ContextView,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Outcome {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let run_bound = remaining < self.config.per_node_timeout;
        let limit = remaining.min(self.config.per_node_timeout);
        let grace = self.config.per_node_timeout.min(DEFAULT_CANCEL_GRACE);

        let call = tokio::time::timeout(
            limit,
            AssertUnwindSafe(member.invoke(task, view)).catch_unwind(),
        );
        tokio::pin!(call);

        let result = tokio::select! {
            biased;
            result = &mut call => Some(result),
            _ = cancel.cancelled() => {
                let grace_end = (Instant::now() + grace).min(deadline);
                tokio::time::timeout_at(grace_end, &mut call).await.ok()
            }
        };

        match result {
            None => Outcome::Stopped(RunError::Cancelled, NodeError::Cancelled),
            Some(Err(_)) if run_bound => Outcome::Stopped(
                RunError::Timeout {
                    limit_ms: millis(self.config.execution_timeout),
                },
                NodeError::RunTimedOut,
            ),
            Some(Err(_)) => Outcome::Stopped(
                RunError::NodeTimeout {
                    node: member.name().to_string(),
                    limit_ms: millis(limit),
                },
                NodeError::Timeout {
                    timeout_ms: millis(limit),
                },
            ),
            Some(Ok(Err(panic))) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Outcome::Failed(format!("executor panicked: {}", message), true)
            }
            Some(Ok(Ok(Err(ExecutorError::Cancelled)))) => {
                Outcome::Stopped(RunError::Cancelled, NodeError::Cancelled)
            }
            Some(Ok(Ok(Err(e)))) => Outcome::Failed(e.to_string(), e.is_retryable()),
            Some(Ok(Ok(Ok(output)))) => Outcome::Output(output),
        }
    }

    /// Target validity and the handoff cap, checked before the transition happens
    fn check_handoff(
        &self,
        from: &str,
        handoff: &Handoff,
        handoffs: u32,
    ) -> Option<RunError> {
        if !self.index.contains_key(&handoff.target) {
            return Some(RunError::UnknownHandoffTarget {
                from: from.to_string(),
                target: handoff.target.clone(),
            });
        }
        if handoffs >= self.config.max_handoffs {
            return Some(RunError::MaxHandoffsExceeded {
                limit: self.config.max_handoffs,
            });
        }
        None
    }

    /// Livelock check over the most recent handoff targets
    ///
    /// An agent counts as unique when it appears exactly once in the window;
    /// two agents bouncing work back and forth contribute none.
    fn check_repetition(&self, targets: &[String]) -> Option<RunError> {
        let window = self.config.repetitive_handoff_detection_window;
        let min_unique = self.config.min_unique_agents_in_window;
        if window == 0 || min_unique == 0 || targets.len() < window {
            return None;
        }

        let recent = &targets[targets.len() - window..];
        let unique_agents = recent
            .iter()
            .filter(|agent| recent.iter().filter(|other| other == agent).count() == 1)
            .count();

        if unique_agents < min_unique {
            Some(RunError::RepetitiveHandoff {
                window,
                unique_agents,
                min_unique,
                recent: recent.to_vec(),
            })
        } else {
            None
        }
    }

    async fn report(
        &self,
        run_id: Uuid,
        started: Instant,
        shared: &SharedLog,
        execution_order: Vec<String>,
        output: Option<(String, Value)>,
        terminated_by: Option<RunError>,
    ) -> OrchestrationResult {
        let invocations: Vec<NodeResult> = shared
            .snapshot()
            .await
            .iter()
            .map(|r| r.as_ref().clone())
            .collect();
        let node_results: BTreeMap<String, NodeResult> = invocations
            .iter()
            .map(|r| (r.node_id.clone(), r.clone()))
            .collect();

        let status = match (&terminated_by, &output) {
            (None, Some(_)) => RunStatus::Completed,
            (Some(RunError::Cancelled), _) => RunStatus::Cancelled,
            (Some(error), Some(_)) if error.is_safety_bound() => RunStatus::Partial,
            _ => RunStatus::Failed,
        };
        let (final_node, final_output) = match output {
            Some((node, value)) => (Some(node), Some(value)),
            None => (None, None),
        };
        let total_elapsed_ms = millis(started.elapsed());

        log::info!(
            "Swarm run {} finished with status {:?} after {} invocations in {}ms",
            run_id,
            status,
            invocations.len(),
            total_elapsed_ms
        );

        OrchestrationResult {
            run_id,
            status,
            execution_order,
            node_results,
            invocations,
            total_elapsed_ms,
            final_node,
            final_output,
            terminated_by,
        }
    }
}

fn handoff_record(node: &str, handoff: &Handoff) -> NodeResult {
    NodeResult {
        output: None,
        handoff: Some(HandoffRecord {
            target: handoff.target.clone(),
            message: handoff.message.clone(),
        }),
        ..NodeResult::completed(node, Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::ExecutorError;
    use crate::adk::executor::FnExecutor;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn hands_to(name: &'static str, target: &'static str) -> Arc<dyn AgentExecutor> {
        Arc::new(FnExecutor::new(name, move |_t, _c| async move {
            Ok(ExecutorOutput::handoff(target, format!("{} -> {}", name, target)))
        }))
    }

    #[tokio::test]
    async fn test_handoff_chain_reaches_final_answer() {
        let writer: Arc<dyn AgentExecutor> = Arc::new(FnExecutor::new(
            "writer",
            |task: String, ctx: ContextView| async move {
                let draft = ctx.state().get("draft").cloned().unwrap_or(Value::Null);
                let from = ctx.handoff().map(|h| h.from.clone()).unwrap_or_default();
                Ok(ExecutorOutput::Final(json!({
                    "draft": draft,
                    "from": from,
                    "saw_handoff": task.contains("--- Handoff from researcher ---"),
                    "log": ctx.results().len(),
                })))
            },
        ));
        let researcher: Arc<dyn AgentExecutor> =
            Arc::new(FnExecutor::new("researcher", |_t, ctx: ContextView| async move {
                assert_eq!(ctx.peers().len(), 1);
                Ok(ExecutorOutput::Handoff(
                    Handoff::new("writer", "notes attached").with_patch("draft", json!("v1")),
                ))
            }));

        let swarm = SwarmCoordinator::new(SwarmConfig::default())
            .add_executor(researcher)
            .add_executor(writer);
        let result = swarm.execute("write about rust").await;

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.execution_order, vec!["researcher", "writer"]);
        assert_eq!(result.final_node.as_deref(), Some("writer"));
        let output = result.final_output.unwrap();
        assert_eq!(output["draft"], "v1");
        assert_eq!(output["from"], "researcher");
        assert_eq!(output["saw_handoff"], true);
        assert_eq!(output["log"], 1);
        assert_eq!(result.invocations.len(), 2);
        assert_eq!(
            result.invocations[0].handoff.as_ref().unwrap().target,
            "writer"
        );
    }

    #[tokio::test]
    async fn test_unknown_target_fails_run() {
        let swarm = SwarmCoordinator::new(SwarmConfig::default())
            .add_executor(hands_to("a", "nobody"));
        let result = swarm.execute("go").await;

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(
            result.terminated_by,
            Some(RunError::UnknownHandoffTarget {
                from: "a".into(),
                target: "nobody".into()
            })
        );
    }

    #[tokio::test]
    async fn test_max_iterations_bound() {
        let swarm = SwarmCoordinator::new(SwarmConfig {
            max_iterations: 3,
            ..Default::default()
        })
        .add_executor(hands_to("a", "b"))
        .add_executor(hands_to("b", "a"));
        let result = swarm.execute("go").await;

        assert_eq!(result.execution_order.len(), 3);
        assert_eq!(
            result.terminated_by,
            Some(RunError::MaxIterationsExceeded { limit: 3 })
        );
        assert_eq!(result.status, RunStatus::Partial);
        assert_eq!(result.final_text().as_deref(), Some("a -> b"));
    }

    #[tokio::test]
    async fn test_handoff_on_last_iteration_is_not_applied() {
        // The fourth handoff would fill the repetition window; it must not count
        let swarm = SwarmCoordinator::new(SwarmConfig {
            max_iterations: 4,
            repetitive_handoff_detection_window: 4,
            min_unique_agents_in_window: 1,
            ..Default::default()
        })
        .add_executor(hands_to("a", "b"))
        .add_executor(hands_to("b", "a"));
        let result = swarm.execute("go").await;

        assert_eq!(
            result.terminated_by,
            Some(RunError::MaxIterationsExceeded { limit: 4 })
        );
        assert_eq!(result.execution_order, vec!["a", "b", "a", "b"]);
        assert_eq!(result.invocations.len(), 4);
        assert_eq!(
            result.invocations[3].handoff.as_ref().unwrap().target,
            "a"
        );
        assert_eq!(result.final_text().as_deref(), Some("b -> a"));
        assert_eq!(result.status, RunStatus::Partial);
    }

    #[tokio::test]
    async fn test_member_observes_cancellation() {
        let waiter: Arc<dyn AgentExecutor> =
            Arc::new(FnExecutor::new("waiter", |_t, ctx: ContextView| async move {
                ctx.cancellation().cancelled().await;
                Err::<ExecutorOutput, _>(ExecutorError::Cancelled)
            }));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = SwarmCoordinator::new(SwarmConfig::default())
            .add_executor(waiter)
            .execute_with_cancel("go", cancel)
            .await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(result.status, RunStatus::Cancelled);
        assert_eq!(
            result.result("waiter").unwrap().error,
            Some(NodeError::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_failing_member_is_retried_then_stops_run() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let broken: Arc<dyn AgentExecutor> = Arc::new(FnExecutor::new("broken", move |_t, _c| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Err::<ExecutorOutput, _>(ExecutorError::failed("down")) }
        }));
        let swarm = SwarmCoordinator::new(SwarmConfig {
            max_retries: 2,
            ..Default::default()
        })
        .add_executor(broken);
        let result = swarm.execute("go").await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(
            result.terminated_by,
            Some(RunError::NodeFailed {
                node: "broken".into(),
                message: "down".into()
            })
        );
        assert_eq!(result.result("broken").unwrap().retries, 2);
    }

    #[tokio::test]
    async fn test_per_node_timeout_bound() {
        let slow: Arc<dyn AgentExecutor> = Arc::new(FnExecutor::new("slow", |_t, _c| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ExecutorOutput::text("late"))
        }));
        let swarm = SwarmCoordinator::new(SwarmConfig {
            per_node_timeout: Duration::from_millis(40),
            ..Default::default()
        })
        .add_executor(slow);
        let result = swarm.execute("go").await;

        assert_eq!(
            result.terminated_by,
            Some(RunError::NodeTimeout {
                node: "slow".into(),
                limit_ms: 40
            })
        );
        assert_eq!(result.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_entry_point() {
        let swarm = SwarmCoordinator::new(SwarmConfig::default())
            .add_executor(hands_to("a", "a"))
            .with_entry_point("ghost");
        let result = swarm.execute("go").await;

        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.execution_order.is_empty());
    }

    #[test]
    fn test_repetition_counts_agents_seen_once() {
        let swarm = SwarmCoordinator::new(SwarmConfig {
            repetitive_handoff_detection_window: 4,
            min_unique_agents_in_window: 2,
            ..Default::default()
        });
        let targets = |ids: &[&str]| ids.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert!(swarm.check_repetition(&targets(&["b", "a", "b"])).is_none());
        assert!(swarm
            .check_repetition(&targets(&["b", "c", "d", "e"]))
            .is_none());
        assert!(swarm
            .check_repetition(&targets(&["x", "b", "c", "b", "d"]))
            .is_none());
        match swarm.check_repetition(&targets(&["b", "a", "b", "a"])) {
            Some(RunError::RepetitiveHandoff { unique_agents, .. }) => {
                assert_eq!(unique_agents, 0)
            }
            other => panic!("expected repetitive handoff, got {:?}", other),
        }
    }
}
