// SPDX-License-Identifier: MIT

//! Run context shared between nodes
//!
//! - `Context` - write-once record of node results for a graph run
//! - `ContextView` - read-only snapshot handed to an executor
//! - `SharedLog` - append-only invocation log and shared state of a swarm run

use crate::adk::error::ContextError;
use crate::adk::executor::Payload;
use crate::kinetic::orchestration::condition::PathLookup;
use crate::kinetic::orchestration::result::{value_to_text, NodeResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Accumulated results of one graph run
///
/// Entries are write-once: recording the same node id twice is an error.
/// The scheduling loop is the only writer; executors only ever see snapshots.
#[derive(Debug, Clone)]
pub struct Context {
    input: Value,
    results: HashMap<String, Arc<NodeResult>>,
    order: Vec<String>,
    /// Per-node lookup scope exposed to guards: `{ output, status, retries }`
    scopes: Map<String, Value>,
    /// Extracted output mappings, merged in record order
    state: Map<String, Value>,
    extracted: HashMap<String, Map<String, Value>>,
}

impl Context {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            input: Value::String(task.into()),
            results: HashMap::new(),
            order: Vec::new(),
            scopes: Map::new(),
            state: Map::new(),
            extracted: HashMap::new(),
        }
    }

    /// The original task description
    pub fn task(&self) -> &str {
        self.input.as_str().unwrap_or_default()
    }

    /// Record a terminal node result
    pub fn record(&mut self, result: NodeResult) -> Result<Arc<NodeResult>, ContextError> {
        self.record_with_state(result, Map::new())
    }

    /// Record a terminal node result together with values extracted from its output
    pub fn record_with_state(
        &mut self,
        result: NodeResult,
        extracted: Map<String, Value>,
    ) -> Result<Arc<NodeResult>, ContextError> {
        if self.results.contains_key(&result.node_id) {
            return Err(ContextError::AlreadyRecorded(result.node_id));
        }

        let id = result.node_id.clone();
        self.scopes.insert(
            id.clone(),
            json!({
                "output": result.output.clone().unwrap_or(Value::Null),
                "status": result.status.as_str(),
                "retries": result.retries,
            }),
        );
        for (k, v) in &extracted {
            self.state.insert(k.clone(), v.clone());
        }
        if !extracted.is_empty() {
            self.extracted.insert(id.clone(), extracted);
        }

        let result = Arc::new(result);
        self.results.insert(id.clone(), Arc::clone(&result));
        self.order.push(id);
        Ok(result)
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeResult> {
        self.results.get(node_id).map(|r| r.as_ref())
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.results.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Results in the order they were recorded
    pub fn iter(&self) -> impl Iterator<Item = &Arc<NodeResult>> {
        self.order.iter().filter_map(|id| self.results.get(id))
    }

    /// Extracted state visible to every guard
    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    /// Snapshot restricted to the given producers
    pub fn view<'a>(&self, visible: impl IntoIterator<Item = &'a str>) -> ContextView {
        let visible: Vec<&str> = visible.into_iter().collect();
        let mut results = Vec::new();
        let mut state = Map::new();

        for id in &self.order {
            if !visible.contains(&id.as_str()) {
                continue;
            }
            if let Some(result) = self.results.get(id) {
                results.push(Arc::clone(result));
            }
            if let Some(values) = self.extracted.get(id) {
                for (k, v) in values {
                    state.insert(k.clone(), v.clone());
                }
            }
        }

        ContextView {
            task: self.task().to_string(),
            results,
            state,
            handoff: None,
            peers: Vec::new(),
            cancellation: CancellationToken::new(),
        }
    }
}

impl PathLookup for Context {
    /// `input`, then node ids, then extracted state keys
    fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;

        let mut current = if first == "input" {
            &self.input
        } else if let Some(scope) = self.scopes.get(first) {
            scope
        } else {
            self.state.get(first)?
        };

        for part in parts {
            current = match current {
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                other => other.get(part)?,
            };
        }
        Some(current)
    }
}

/// Message that transferred control to the current swarm node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffMessage {
    pub from: String,
    pub message: String,
}

/// A swarm member another node may hand off to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub name: String,
    pub description: String,
}

/// Read-only snapshot of the context, passed to `AgentExecutor::invoke`
#[derive(Debug, Clone, Default)]
pub struct ContextView {
    task: String,
    results: Vec<Arc<NodeResult>>,
    state: Map<String, Value>,
    handoff: Option<HandoffMessage>,
    peers: Vec<PeerInfo>,
    cancellation: CancellationToken,
}

impl ContextView {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Default::default()
        }
    }

    pub(crate) fn with_results(mut self, results: Vec<Arc<NodeResult>>) -> Self {
        self.results = results;
        self
    }

    pub(crate) fn with_state(mut self, state: Map<String, Value>) -> Self {
        self.state = state;
        self
    }

    pub(crate) fn with_handoff(mut self, handoff: Option<HandoffMessage>) -> Self {
        self.handoff = handoff;
        self
    }

    pub(crate) fn with_peers(mut self, peers: Vec<PeerInfo>) -> Self {
        self.peers = peers;
        self
    }

    pub(crate) fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The original task description
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Visible results, oldest first
    pub fn results(&self) -> &[Arc<NodeResult>] {
        &self.results
    }

    /// Most recent visible result of a node
    pub fn result(&self, node_id: &str) -> Option<&NodeResult> {
        self.results
            .iter()
            .rev()
            .find(|r| r.node_id == node_id)
            .map(|r| r.as_ref())
    }

    pub fn output(&self, node_id: &str) -> Option<&Payload> {
        self.result(node_id).and_then(|r| r.output.as_ref())
    }

    pub fn output_text(&self, node_id: &str) -> Option<String> {
        self.output(node_id).map(value_to_text)
    }

    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    pub fn handoff(&self) -> Option<&HandoffMessage> {
        self.handoff.as_ref()
    }

    /// Swarm members this node may hand off to; empty outside swarm mode
    pub fn peers(&self) -> &[PeerInfo] {
        &self.peers
    }

    /// Fires when the run is cancelled or runs out of time
    ///
    /// Executors that select on it can return within the cancellation grace
    /// period; anything still running when the grace ends is dropped.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.state.is_empty() && self.handoff.is_none()
    }

    /// Render visible results and state as prompt text
    pub fn render(&self) -> String {
        let mut sections = Vec::new();
        for result in &self.results {
            let body = match (&result.handoff, result.output_text()) {
                (Some(h), _) => format!("handed off to {}: {}", h.target, h.message),
                (None, Some(text)) => text,
                (None, None) => format!("({})", result.status.as_str()),
            };
            sections.push(format!("[{}]\n{}", result.node_id, body));
        }
        if !self.state.is_empty() {
            sections.push(format!(
                "[shared state]\n{}",
                value_to_text(&Value::Object(self.state.clone()))
            ));
        }
        sections.join("\n\n")
    }
}

/// Build a node's task text from the original task and its direct dependencies
pub fn compose_task(task: &str, dependencies: &[Arc<NodeResult>]) -> String {
    let mut text = task.to_string();
    for dep in dependencies {
        if let Some(output) = dep.output_text() {
            text.push_str(&format!("\n\n--- Output of {} ---\n{}", dep.node_id, output));
        }
    }
    text
}

/// Append-only log and shared state of a swarm run
///
/// Every node sees the entire log; readers take snapshots and never block
/// one another, the single append is serialized by the write lock.
#[derive(Debug, Default)]
pub struct SharedLog {
    entries: RwLock<Vec<Arc<NodeResult>>>,
    state: RwLock<Map<String, Value>>,
}

impl SharedLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one invocation record; returns its sequence number
    pub async fn append(&self, record: NodeResult) -> usize {
        let mut entries = self.entries.write().await;
        entries.push(Arc::new(record));
        entries.len() - 1
    }

    /// Merge a handoff's context patch, last write wins per key
    pub async fn merge_patch(&self, patch: &Map<String, Value>) {
        if patch.is_empty() {
            return;
        }
        let mut state = self.state.write().await;
        for (k, v) in patch {
            state.insert(k.clone(), v.clone());
        }
    }

    pub async fn snapshot(&self) -> Vec<Arc<NodeResult>> {
        self.entries.read().await.clone()
    }

    pub async fn state(&self) -> Map<String, Value> {
        self.state.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
