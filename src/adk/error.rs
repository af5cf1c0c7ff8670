// SPDX-License-Identifier: MIT

//! Typed error handling for kinetic-orchestrator
//!
//! Errors are split by the phase in which they occur:
//! - [`GraphError`] - structural problems detected by `build()`, before anything runs
//! - [`ExecutorError`] - raised by an executor during a single invocation
//! - [`NodeError`] - the recorded, serializable reason a node did not complete
//! - [`RunError`] - conditions that terminate a whole run (safety bounds, cancellation)

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Top-level error type, used by the definition layer and the CLI
#[derive(Debug, Error)]
pub enum KineticError {
    /// Graph validation failed
    #[error("Invalid graph: {0}")]
    Graph(#[from] GraphError),

    /// Declarative definition could not be turned into an orchestration
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// Model client could not be created or called
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Structural errors raised by `DependencyGraphBuilder::build`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The graph contains no nodes
    #[error("graph has no nodes")]
    Empty,

    /// Two nodes share the same id
    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    /// An edge or dependency references a node that was never added
    #[error("edge {from} -> {to} references unknown node '{missing}'")]
    DanglingEdge {
        from: String,
        to: String,
        missing: String,
    },

    /// The edge set contains a cycle; the path closes on its first element
    #[error("cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// A non-entry node cannot be reached from any entry point
    #[error("node '{0}' is not reachable from any entry point")]
    UnreachableNode(String),

    /// An entry point names an unknown node
    #[error("entry point '{0}' is not a node of this graph")]
    UnknownEntryPoint(String),

    /// An entry point has inbound edges
    #[error("entry point '{0}' must not have dependencies")]
    EntryPointHasDependencies(String),

    /// A designated sink names an unknown node
    #[error("sink '{0}' is not a node of this graph")]
    UnknownSink(String),

    /// A guard expression failed to parse
    #[error("guard on edge {from} -> {to} is invalid: {reason}")]
    InvalidGuard {
        from: String,
        to: String,
        reason: String,
    },
}

/// Error returned by an executor invocation
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Generic failure reported by the executor
    #[error("{0}")]
    Failed(String),

    /// The backing model failed
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// The executor rejected its input; not worth retrying
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The executor observed run cancellation and gave up
    #[error("cancelled")]
    Cancelled,
}

impl ExecutorError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidInput(_) | Self::Cancelled)
    }
}

impl From<String> for ExecutorError {
    fn from(s: String) -> Self {
        Self::Failed(s)
    }
}

impl From<&str> for ExecutorError {
    fn from(s: &str) -> Self {
        Self::Failed(s.to_string())
    }
}

/// Reason a node ended FAILED or SKIPPED, as recorded in its `NodeResult`
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeError {
    /// The executor returned an error on its final attempt
    #[error("executor failed: {message}")]
    Executor { message: String },

    /// The final attempt exceeded the per-node timeout
    #[error("node timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// An upstream node failed or was skipped, so this node cannot run
    #[error("dependency '{upstream}' did not complete")]
    SkippedDependency { upstream: String },

    /// None of the node's guarded inbound edges was satisfied
    #[error("no inbound guard was satisfied")]
    GuardNotSatisfied,

    /// The run was cancelled while the node was pending or running
    #[error("cancelled")]
    Cancelled,

    /// The run hit its execution timeout before the node could finish
    #[error("run timed out before the node finished")]
    RunTimedOut,

    /// The executor asked for a handoff outside of swarm mode
    #[error("handoff to '{target}' is not supported in graph mode")]
    UnexpectedHandoff { target: String },
}

/// Condition that terminated a run early
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunError {
    /// The run exceeded its wall-clock budget
    #[error("execution timeout of {limit_ms}ms exceeded")]
    Timeout { limit_ms: u64 },

    /// A single swarm node exceeded its wall-clock budget
    #[error("node '{node}' exceeded its timeout of {limit_ms}ms")]
    NodeTimeout { node: String, limit_ms: u64 },

    /// Too many handoff transitions
    #[error("maximum of {limit} handoffs exceeded")]
    MaxHandoffsExceeded { limit: u32 },

    /// Too many node invocations
    #[error("maximum of {limit} iterations exceeded")]
    MaxIterationsExceeded { limit: u32 },

    /// Recent handoffs circulate among too few agents
    #[error(
        "repetitive handoff: only {unique_agents} unique agents in the last {window} handoffs (minimum {min_unique})"
    )]
    RepetitiveHandoff {
        window: usize,
        unique_agents: usize,
        min_unique: usize,
        recent: Vec<String>,
    },

    /// A handoff named an agent that is not part of the swarm
    #[error("node '{from}' handed off to unknown agent '{target}'")]
    UnknownHandoffTarget { from: String, target: String },

    /// A swarm node exhausted its retries
    #[error("node '{node}' failed: {message}")]
    NodeFailed { node: String, message: String },

    /// The caller cancelled the run
    #[error("run cancelled")]
    Cancelled,
}

impl RunError {
    /// Whether this error is a configured safety bound rather than a failure
    pub fn is_safety_bound(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::NodeTimeout { .. }
                | Self::MaxHandoffsExceeded { .. }
                | Self::MaxIterationsExceeded { .. }
                | Self::RepetitiveHandoff { .. }
        )
    }
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Provider not supported
    #[error("Unknown model provider: {0}")]
    UnsupportedProvider(String),

    /// Non-success HTTP status from the provider
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ModelError {
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Guard expression parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("empty condition")]
    Empty,

    #[error("could not parse condition: {0}")]
    Syntax(String),

    #[error("could not parse literal: {0}")]
    Literal(String),

    #[error("unbalanced parentheses in: {0}")]
    Unbalanced(String),
}

/// Write-once violations on the run context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("result for node '{0}' was already recorded")]
    AlreadyRecorded(String),
}

/// Errors turning a declarative definition into an orchestration
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// Unknown `kind`
    #[error("Unknown definition kind: {0}")]
    UnknownKind(String),

    /// The section matching `kind` is absent
    #[error("{kind} definition is missing its '{section}' section")]
    MissingSection { kind: String, section: String },

    /// A node or step references an agent that is not declared
    #[error("Agent '{0}' is not declared")]
    UnknownAgent(String),

    /// Two agents share a name
    #[error("Agent '{0}' is declared twice")]
    DuplicateAgent(String),

    /// Building the underlying model failed
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Graph validation failed
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Convert a duration to whole milliseconds for reporting
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_lists_path() {
        let err = GraphError::Cycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "cycle detected: a -> b -> a");
    }

    #[test]
    fn test_invalid_input_not_retryable() {
        assert!(!ExecutorError::InvalidInput("bad".into()).is_retryable());
        assert!(!ExecutorError::Cancelled.is_retryable());
        assert!(ExecutorError::failed("flaky").is_retryable());
    }

    #[test]
    fn test_run_error_serializes_with_kind_tag() {
        let err = RunError::MaxHandoffsExceeded { limit: 3 };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "max_handoffs_exceeded");
        assert_eq!(json["limit"], 3);
        assert!(err.is_safety_bound());
        assert!(!RunError::Cancelled.is_safety_bound());
    }

    #[test]
    fn test_node_error_display() {
        let err = NodeError::SkippedDependency {
            upstream: "research".into(),
        };
        assert!(err.to_string().contains("research"));
    }
}
