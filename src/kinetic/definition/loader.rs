// SPDX-License-Identifier: MIT

//! Definition loader - YAML file loading and parsing

use super::types::OrchestrationDefinition;
use crate::adk::error::KineticError;
use std::fs;
use std::path::Path;

/// Loads orchestration definitions from YAML
#[derive(Debug, Default)]
pub struct DefinitionLoader;

impl DefinitionLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<OrchestrationDefinition, KineticError> {
        let path = path.as_ref();
        log::debug!("Loading definition from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    pub fn parse_yaml(content: &str) -> Result<OrchestrationDefinition, KineticError> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetic::definition::types::DependsOn;

    #[test]
    fn test_parse_graph_definition() {
        let yaml = r#"
kind: Graph
name: support
agents:
  - name: classify
    instructions: "Return JSON with an intent field."
    model:
      model_name: gpt-4o-mini
      parameters:
        temperature: 0.1
  - name: refund
    instructions: "Handle refunds."
graph:
  nodes:
    - id: classify
      outputs:
        intent: intent
    - id: refund
      max_retries: 2
  edges:
    - from: classify
      to: refund
      when: "intent == 'refund'"
  config:
    max_concurrency: 2
    node_timeout_ms: 30000
"#;
        let def = DefinitionLoader::parse_yaml(yaml).unwrap();
        assert_eq!(def.kind, "Graph");
        assert_eq!(def.agents.len(), 2);
        assert_eq!(def.agents[0].model.parameters.temperature, Some(0.1));
        assert!(def.agents[1].model.model_name.is_none());

        let graph = def.graph.unwrap();
        assert_eq!(graph.nodes[0].outputs["intent"], "intent");
        assert_eq!(graph.nodes[1].agent_name(), "refund");
        assert_eq!(graph.nodes[1].max_retries, Some(2));
        assert_eq!(graph.edges[0].when.as_deref(), Some("intent == 'refund'"));
        assert_eq!(graph.config.node_timeout_ms, Some(30000));
    }

    #[test]
    fn test_parse_depends_on_single_string() {
        let yaml = r#"
kind: Graph
name: pipeline
graph:
  nodes:
    - id: a
    - id: b
      agent: writer
      depends_on: a
"#;
        let def = DefinitionLoader::parse_yaml(yaml).unwrap();
        let nodes = def.graph.unwrap().nodes;
        assert_eq!(nodes[0].depends_on, DependsOn::None);
        assert_eq!(nodes[1].depends_on, DependsOn::Single("a".into()));
        assert_eq!(nodes[1].agent_name(), "writer");
    }

    #[test]
    fn test_parse_swarm_definition() {
        let yaml = r#"
kind: Swarm
name: team
swarm:
  entry_point: triage
  config:
    max_handoffs: 5
    per_node_timeout_ms: 60000
"#;
        let def = DefinitionLoader::parse_yaml(yaml).unwrap();
        let swarm = def.swarm.unwrap();
        assert_eq!(swarm.entry_point, "triage");
        assert!(swarm.members.is_empty());
        assert_eq!(swarm.config.max_handoffs, Some(5));
    }

    #[test]
    fn test_invalid_yaml_is_reported() {
        let err = DefinitionLoader::parse_yaml("kind: [").unwrap_err();
        assert!(matches!(err, KineticError::Yaml(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = DefinitionLoader::new()
            .load_file("/nonexistent/definition.yaml")
            .unwrap_err();
        assert!(matches!(err, KineticError::Io(_)));
    }
}
