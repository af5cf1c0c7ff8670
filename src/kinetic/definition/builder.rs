// SPDX-License-Identifier: MIT

//! Definition builder - turns a parsed definition into a runnable orchestration

use super::loader::DefinitionLoader;
use super::types::{
    AgentDefinition, GraphDefinition, OrchestrationDefinition, SwarmDefinition,
    WorkflowDefinition,
};
use crate::adk::error::{DefinitionError, KineticError, ModelError};
use crate::adk::executor::AgentExecutor;
use crate::adk::llm::LlmExecutor;
use crate::adk::model::{Content, GenerationConfig, Model, Provider, ToolSpec};
use crate::kinetic::orchestration::config::{SchedulerConfig, SwarmConfig};
use crate::kinetic::orchestration::graph::{DependencyGraph, Edge, GraphScheduler, Guard, NodeSpec};
use crate::kinetic::orchestration::result::OrchestrationResult;
use crate::kinetic::orchestration::swarm::SwarmCoordinator;
use crate::kinetic::orchestration::workflow::{Task, WorkflowScheduler};
use async_trait::async_trait;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Supplies the model behind each declared agent
pub trait ModelProvider: Send + Sync {
    fn model(&self, agent: &AgentDefinition) -> Result<Arc<dyn Model>, ModelError>;
}

/// Model name from the definition, `MODEL_NAME`, or the default
fn model_name(agent: &AgentDefinition) -> String {
    agent
        .model
        .model_name
        .clone()
        .or_else(|| env::var("MODEL_NAME").ok())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

/// Explicit provider > `MODEL_PROVIDER` > model name prefix
fn resolve_provider(agent: &AgentDefinition, model_name: &str) -> Result<Provider, ModelError> {
    match &agent.model.provider {
        Some(provider) => provider.parse(),
        None => Provider::infer(model_name),
    }
}

/// Hosted models, credentials read from the environment
#[derive(Debug, Default)]
pub struct EnvModelProvider;

impl ModelProvider for EnvModelProvider {
    fn model(&self, agent: &AgentDefinition) -> Result<Arc<dyn Model>, ModelError> {
        let name = model_name(agent);
        resolve_provider(agent, &name)?.create(&name)
    }
}

/// Resolves providers without touching credentials; the models refuse to run
#[derive(Debug, Default)]
pub struct OfflineModelProvider;

struct OfflineModel {
    provider: Provider,
}

#[async_trait]
impl Model for OfflineModel {
    async fn generate_content(
        &self,
        _history: &[Content],
        _config: Option<&GenerationConfig>,
        _tools: Option<&[ToolSpec]>,
    ) -> Result<Content, ModelError> {
        Err(ModelError::api(
            self.provider.to_string(),
            "offline model cannot generate content",
        ))
    }
}

impl ModelProvider for OfflineModelProvider {
    fn model(&self, agent: &AgentDefinition) -> Result<Arc<dyn Model>, ModelError> {
        let provider = resolve_provider(agent, &model_name(agent))?;
        Ok(Arc::new(OfflineModel { provider }))
    }
}

/// A runnable orchestration of any kind
pub enum Orchestration {
    Graph(GraphScheduler),
    Workflow(WorkflowScheduler),
    Swarm(SwarmCoordinator),
}

impl Orchestration {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Graph(_) => "Graph",
            Self::Workflow(_) => "Workflow",
            Self::Swarm(_) => "Swarm",
        }
    }

    pub async fn execute(&self, task: impl Into<String>) -> OrchestrationResult {
        self.execute_with_cancel(task, CancellationToken::new()).await
    }

    pub async fn execute_with_cancel(
        &self,
        task: impl Into<String>,
        cancel: CancellationToken,
    ) -> OrchestrationResult {
        match self {
            Self::Graph(s) => s.execute_with_cancel(task, cancel).await,
            Self::Workflow(s) => s.execute_with_cancel(task, cancel).await,
            Self::Swarm(s) => s.execute_with_cancel(task, cancel).await,
        }
    }
}

type Executors = HashMap<String, Arc<dyn AgentExecutor>>;

/// Builds orchestrations from YAML definitions
pub struct Builder {
    loader: DefinitionLoader,
    provider: Arc<dyn ModelProvider>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::with_provider(Arc::new(EnvModelProvider))
    }

    pub fn with_provider(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            loader: DefinitionLoader::new(),
            provider,
        }
    }

    pub fn build_file<P: AsRef<Path>>(&self, path: P) -> Result<Orchestration, KineticError> {
        let def = self.loader.load_file(path)?;
        Ok(self.build(&def)?)
    }

    pub fn build_yaml(&self, yaml: &str) -> Result<Orchestration, KineticError> {
        let def = DefinitionLoader::parse_yaml(yaml)?;
        Ok(self.build(&def)?)
    }

    pub fn build(&self, def: &OrchestrationDefinition) -> Result<Orchestration, DefinitionError> {
        let executors = self.executors(&def.agents)?;
        let missing = |section: &str| DefinitionError::MissingSection {
            kind: def.kind.clone(),
            section: section.to_string(),
        };

        let orchestration = match def.kind.to_ascii_lowercase().as_str() {
            "graph" => {
                let graph = def.graph.as_ref().ok_or_else(|| missing("graph"))?;
                Orchestration::Graph(build_graph(graph, &executors)?)
            }
            "workflow" => {
                let workflow = def.workflow.as_ref().ok_or_else(|| missing("workflow"))?;
                Orchestration::Workflow(build_workflow(workflow, &executors)?)
            }
            "swarm" => {
                let swarm = def.swarm.as_ref().ok_or_else(|| missing("swarm"))?;
                Orchestration::Swarm(build_swarm(swarm, &def.agents, &executors)?)
            }
            _ => return Err(DefinitionError::UnknownKind(def.kind.clone())),
        };

        log::info!(
            "Built {} orchestration '{}' with {} agents",
            orchestration.kind(),
            def.name,
            executors.len()
        );
        Ok(orchestration)
    }

    fn executors(&self, agents: &[AgentDefinition]) -> Result<Executors, DefinitionError> {
        let mut executors = Executors::new();
        for agent in agents {
            if executors.contains_key(&agent.name) {
                return Err(DefinitionError::DuplicateAgent(agent.name.clone()));
            }
            let model = self.provider.model(agent)?;
            let executor = LlmExecutor::new(
                agent.name.clone(),
                agent.description.clone(),
                agent.instructions.clone(),
                model,
            )
            .with_generation_config(agent.model.parameters.clone());
            log::debug!("Declared agent '{}'", agent.name);
            executors.insert(agent.name.clone(), Arc::new(executor));
        }
        Ok(executors)
    }
}

fn lookup(executors: &Executors, name: &str) -> Result<Arc<dyn AgentExecutor>, DefinitionError> {
    executors
        .get(name)
        .cloned()
        .ok_or_else(|| DefinitionError::UnknownAgent(name.to_string()))
}

fn build_graph(def: &GraphDefinition, executors: &Executors) -> Result<GraphScheduler, DefinitionError> {
    let mut builder = DependencyGraph::builder();

    for node in &def.nodes {
        let mut spec = NodeSpec::new(node.id.clone(), lookup(executors, node.agent_name())?)
            .depends_on(node.depends_on.to_vec())
            .priority(node.priority);
        if let Some(retries) = node.max_retries {
            spec = spec.max_retries(retries);
        }
        for (key, path) in &node.outputs {
            spec = spec.output(key.clone(), path.clone());
        }
        builder = builder.node(spec);
    }

    for edge in &def.edges {
        builder = builder.edge(match &edge.when {
            Some(expr) => Edge::when(edge.from.clone(), edge.to.clone(), Guard::expr(expr.clone())),
            None => Edge::new(edge.from.clone(), edge.to.clone()),
        });
    }
    if !def.entry_points.is_empty() {
        builder = builder.set_entry_points(def.entry_points.iter().cloned());
    }
    if !def.sinks.is_empty() {
        builder = builder.set_sinks(def.sinks.iter().cloned());
    }

    let graph = builder.build()?;
    Ok(GraphScheduler::new(graph, SchedulerConfig::from(&def.config)))
}

fn build_workflow(
    def: &WorkflowDefinition,
    executors: &Executors,
) -> Result<WorkflowScheduler, DefinitionError> {
    let mut builder = WorkflowScheduler::builder().config(SchedulerConfig::from(&def.config));
    let mut previous: Option<&str> = None;

    for step in &def.steps {
        let after = match &step.after {
            Some(after) => after.to_vec(),
            None => previous.map(|p| vec![p.to_string()]).unwrap_or_default(),
        };
        let mut task = Task::new(step.id.clone(), lookup(executors, step.agent_name())?)
            .after(after)
            .priority(step.priority);
        if let Some(retries) = step.max_retries {
            task = task.max_retries(retries);
        }
        for (key, path) in &step.outputs {
            task = task.output(key.clone(), path.clone());
        }
        builder = builder.task(task);
        previous = Some(step.id.as_str());
    }

    Ok(builder.build()?)
}

fn build_swarm(
    def: &SwarmDefinition,
    agents: &[AgentDefinition],
    executors: &Executors,
) -> Result<SwarmCoordinator, DefinitionError> {
    let members: Vec<&str> = if def.members.is_empty() {
        agents.iter().map(|a| a.name.as_str()).collect()
    } else {
        def.members.iter().map(String::as_str).collect()
    };
    if !members.contains(&def.entry_point.as_str()) {
        return Err(DefinitionError::UnknownAgent(def.entry_point.clone()));
    }

    let mut swarm = SwarmCoordinator::new(SwarmConfig::from(&def.config));
    for name in members {
        swarm = swarm.add_executor(lookup(executors, name)?);
    }
    Ok(swarm.with_entry_point(def.entry_point.clone()))
}
