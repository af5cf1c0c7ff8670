// SPDX-License-Identifier: MIT

//! YAML schema for orchestration definitions
//!
//! One file declares the agents once and then exactly one of the `graph`,
//! `workflow` or `swarm` sections, selected by `kind`. Durations are given
//! in milliseconds (`*_ms`).

use crate::adk::model::GenerationConfig;
use crate::kinetic::orchestration::config::{SchedulerConfig, SwarmConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Top-level orchestration definition
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OrchestrationDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// "Graph", "Workflow" or "Swarm"
    pub kind: String,
    #[serde(default)]
    pub agents: Vec<AgentDefinition>,
    pub graph: Option<GraphDefinition>,
    pub workflow: Option<WorkflowDefinition>,
    pub swarm: Option<SwarmDefinition>,
}

/// An LLM-backed agent, referenced by name from nodes, steps and swarms
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AgentDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub instructions: String,
    #[serde(default)]
    pub model: ModelDefinition,
}

/// Model selection; provider is inferred from `MODEL_PROVIDER` or the model name when absent
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ModelDefinition {
    pub provider: Option<String>,
    pub model_name: Option<String>,
    #[serde(default)]
    pub parameters: GenerationConfig,
}

/// Dependency list, written as a single id or a list
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(untagged)]
pub enum DependsOn {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl DependsOn {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            DependsOn::None => vec![],
            DependsOn::Single(s) => vec![s.clone()],
            DependsOn::Multiple(v) => v.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GraphDefinition {
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    #[serde(default)]
    pub entry_points: Vec<String>,
    #[serde(default)]
    pub sinks: Vec<String>,
    #[serde(default)]
    pub config: SchedulerSettings,
}

/// A graph node or workflow step bound to a declared agent
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeDefinition {
    pub id: String,
    /// Agent name; defaults to the node id
    pub agent: Option<String>,
    #[serde(default)]
    pub depends_on: DependsOn,
    #[serde(default)]
    pub priority: i32,
    pub max_retries: Option<u32>,
    /// State key -> JSON path into the node's output
    #[serde(default)]
    pub outputs: HashMap<String, String>,
}

impl NodeDefinition {
    pub fn agent_name(&self) -> &str {
        self.agent.as_deref().unwrap_or(&self.id)
    }
}

/// Edge with an optional guard expression
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EdgeDefinition {
    pub from: String,
    pub to: String,
    pub when: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowDefinition {
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub config: SchedulerSettings,
}

/// Workflow step; without `after` it runs after the previous step
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StepDefinition {
    pub id: String,
    pub agent: Option<String>,
    pub after: Option<DependsOn>,
    #[serde(default)]
    pub priority: i32,
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub outputs: HashMap<String, String>,
}

impl StepDefinition {
    pub fn agent_name(&self) -> &str {
        self.agent.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SwarmDefinition {
    pub entry_point: String,
    /// Participating agents; all declared agents when empty
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub config: SwarmSettings,
}

/// `SchedulerConfig` as written in YAML
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SchedulerSettings {
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub max_concurrency: Option<usize>,
    pub node_timeout_ms: Option<u64>,
    pub execution_timeout_ms: Option<u64>,
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(s: &SchedulerSettings) -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            max_retries: s.max_retries.unwrap_or(defaults.max_retries),
            retry_delay: s
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            max_concurrency: s.max_concurrency.or(defaults.max_concurrency),
            node_timeout: s.node_timeout_ms.map(Duration::from_millis),
            execution_timeout: s.execution_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// `SwarmConfig` as written in YAML
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SwarmSettings {
    pub max_handoffs: Option<u32>,
    pub max_iterations: Option<u32>,
    pub execution_timeout_ms: Option<u64>,
    pub per_node_timeout_ms: Option<u64>,
    pub repetitive_handoff_detection_window: Option<usize>,
    pub min_unique_agents_in_window: Option<usize>,
    pub max_retries: Option<u32>,
}

impl From<&SwarmSettings> for SwarmConfig {
    fn from(s: &SwarmSettings) -> Self {
        let d = SwarmConfig::default();
        Self {
            max_handoffs: s.max_handoffs.unwrap_or(d.max_handoffs),
            max_iterations: s.max_iterations.unwrap_or(d.max_iterations),
            execution_timeout: s
                .execution_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(d.execution_timeout),
            per_node_timeout: s
                .per_node_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(d.per_node_timeout),
            repetitive_handoff_detection_window: s
                .repetitive_handoff_detection_window
                .unwrap_or(d.repetitive_handoff_detection_window),
            min_unique_agents_in_window: s
                .min_unique_agents_in_window
                .unwrap_or(d.min_unique_agents_in_window),
            max_retries: s.max_retries.unwrap_or(d.max_retries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depends_on_forms() {
        assert!(DependsOn::None.to_vec().is_empty());
        assert_eq!(DependsOn::Single("a".into()).to_vec(), vec!["a"]);
        assert_eq!(
            DependsOn::Multiple(vec!["a".into(), "b".into()]).to_vec(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_scheduler_settings_fill_defaults() {
        let settings = SchedulerSettings {
            node_timeout_ms: Some(1500),
            ..Default::default()
        };
        let config = SchedulerConfig::from(&settings);
        assert_eq!(config.node_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.execution_timeout, None);
    }

    #[test]
    fn test_swarm_settings_fill_defaults() {
        let settings = SwarmSettings {
            max_handoffs: Some(3),
            repetitive_handoff_detection_window: Some(4),
            ..Default::default()
        };
        let config = SwarmConfig::from(&settings);
        assert_eq!(config.max_handoffs, 3);
        assert_eq!(config.repetitive_handoff_detection_window, 4);
        assert_eq!(config.max_iterations, 20);
        assert_eq!(config.per_node_timeout, Duration::from_secs(300));
    }
}
