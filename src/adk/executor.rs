// SPDX-License-Identifier: MIT

//! Executor contract consumed by every orchestration strategy
//!
//! An executor is an opaque unit of work: it receives a task description and a
//! read-only view of the context, and either produces a payload or (in swarm
//! mode) hands control to another named executor.
//! - `LlmExecutor` - delegates to a language model
//! - `FnExecutor` - wraps a deterministic async function

use crate::adk::error::ExecutorError;
use crate::kinetic::orchestration::context::ContextView;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;

/// Output payload of a node; opaque to the schedulers
pub type Payload = Value;

/// What an executor returns from a single invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorOutput {
    /// A terminal result
    Final(Payload),
    /// Transfer control to another swarm member
    Handoff(Handoff),
}

impl ExecutorOutput {
    /// Final text output
    pub fn text(text: impl Into<String>) -> Self {
        Self::Final(Value::String(text.into()))
    }

    /// Handoff without a context patch
    pub fn handoff(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handoff(Handoff::new(target, message))
    }
}

impl From<Payload> for ExecutorOutput {
    fn from(value: Payload) -> Self {
        Self::Final(value)
    }
}

/// Request to continue the run on another swarm member
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Handoff {
    /// Name of the executor that should run next
    pub target: String,
    /// Message passed to the target alongside the shared context
    pub message: String,
    /// Keys merged into the shared state, last write wins
    #[serde(default)]
    pub context_patch: Map<String, Value>,
}

impl Handoff {
    pub fn new(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            message: message.into(),
            context_patch: Map::new(),
        }
    }

    pub fn with_patch(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context_patch.insert(key.into(), value);
        self
    }
}

/// Core executor trait for all node implementations
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Returns the executor name
    fn name(&self) -> &str;

    /// Short description, shown to swarm peers choosing a handoff target
    fn description(&self) -> &str {
        ""
    }

    /// Run one invocation
    async fn invoke(
        &self,
        task: String,
        context: ContextView,
    ) -> Result<ExecutorOutput, ExecutorError>;
}

/// Deterministic executor backed by an async function
pub struct FnExecutor<F> {
    name: String,
    description: String,
    func: F,
}

impl<F, Fut> FnExecutor<F>
where
    F: Fn(String, ContextView) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ExecutorOutput, ExecutorError>> + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            func,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl<F, Fut> AgentExecutor for FnExecutor<F>
where
    F: Fn(String, ContextView) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ExecutorOutput, ExecutorError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(
        &self,
        task: String,
        context: ContextView,
    ) -> Result<ExecutorOutput, ExecutorError> {
        (self.func)(task, context).await
    }
}
