// SPDX-License-Identifier: MIT

//! Run outcome records
//!
//! `NodeResult` is produced once per node (graph mode) or once per invocation
//! (swarm mode) and never mutated after it is recorded. `OrchestrationResult`
//! is the plain serializable report handed back to the caller.

use crate::adk::error::{NodeError, RunError};
use crate::adk::executor::Payload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Lifecycle of a node within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Allowed transitions; FAILED -> PENDING is the retry path
    pub fn can_transition_to(self, next: NodeStatus) -> bool {
        use NodeStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, Skipped)
                | (Ready, Running)
                | (Ready, Skipped)
                | (Running, Completed)
                | (Running, Failed)
                | (Failed, Pending)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Handoff issued by a swarm invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub target: String,
    pub message: String,
}

/// Outcome of one node (or one swarm invocation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub node_id: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff: Option<HandoffRecord>,
}

impl NodeResult {
    pub fn completed(node_id: impl Into<String>, output: Payload) -> Self {
        Self {
            node_id: node_id.into(),
            status: NodeStatus::Completed,
            output: Some(output),
            started_at: None,
            finished_at: None,
            elapsed_ms: 0,
            retries: 0,
            error: None,
            handoff: None,
        }
    }

    pub fn failed(node_id: impl Into<String>, error: NodeError) -> Self {
        Self {
            status: NodeStatus::Failed,
            output: None,
            error: Some(error),
            ..Self::completed(node_id, Value::Null)
        }
    }

    pub fn skipped(node_id: impl Into<String>, error: NodeError) -> Self {
        Self {
            status: NodeStatus::Skipped,
            ..Self::failed(node_id, error)
        }
    }

    pub fn with_timing(mut self, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        self.elapsed_ms = u64::try_from((finished_at - started_at).num_milliseconds()).unwrap_or(0);
        self.started_at = Some(started_at);
        self.finished_at = Some(finished_at);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == NodeStatus::Completed
    }

    /// Output rendered as readable text
    pub fn output_text(&self) -> Option<String> {
        self.output.as_ref().map(value_to_text)
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Completed,
    Failed,
    Partial,
    Cancelled,
}

/// Report returned by every strategy once execution has begun
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Node ids in actual start order (swarm: one entry per invocation)
    pub execution_order: Vec<String>,
    /// Per-node results; in swarm mode the latest invocation of each node
    pub node_results: BTreeMap<String, NodeResult>,
    /// Every swarm invocation in order; empty for graph runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<NodeResult>,
    pub total_elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_output: Option<Payload>,
    /// Bound or condition that stopped the run early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_by: Option<RunError>,
}

impl OrchestrationResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Final output rendered as text
    pub fn final_text(&self) -> Option<String> {
        self.final_output.as_ref().map(value_to_text)
    }

    pub fn result(&self, node_id: &str) -> Option<&NodeResult> {
        self.node_results.get(node_id)
    }

    /// Ids of nodes that ended FAILED
    pub fn failed_nodes(&self) -> Vec<&str> {
        self.node_results
            .values()
            .filter(|r| r.status == NodeStatus::Failed)
            .map(|r| r.node_id.as_str())
            .collect()
    }

    /// Ids of nodes that ended SKIPPED
    pub fn skipped_nodes(&self) -> Vec<&str> {
        self.node_results
            .values()
            .filter(|r| r.status == NodeStatus::Skipped)
            .map(|r| r.node_id.as_str())
            .collect()
    }
}

/// Convert a JSON payload to readable text
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            // A single "result"/"answer"/"response" key unwraps to its value
            if obj.len() == 1 {
                if let Some(v) = obj
                    .get("result")
                    .or(obj.get("answer"))
                    .or(obj.get("response"))
                {
                    return value_to_text(v);
                }
            }
            obj.iter()
                .map(|(k, v)| format!("{}: {}", k, value_to_text(v)))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Value::Array(arr) => arr
            .iter()
            .map(|v| format!("- {}", value_to_text(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
    }
}

/// Extract a value from JSON using a simple dot-notation path
pub fn extract_json_path(json: &Value, path: &str) -> Option<Value> {
    let mut current = json;
    for part in path.split('.') {
        current = match current {
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            other => other.get(part)?,
        };
    }
    Some(current.clone())
}
