// SPDX-License-Identifier: MIT

//! Graph construction types
//!
//! Plain dependencies are universal: a node waits for every one of them.
//! Guarded edges are existential: one completed source whose guard holds is enough.

use crate::adk::executor::AgentExecutor;
use crate::kinetic::orchestration::condition::{self, Expression};
use crate::kinetic::orchestration::context::Context;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Pure predicate over the accumulated context
pub type GuardFn = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Condition attached to an edge
#[derive(Clone)]
pub enum Guard {
    /// Expression in the guard language, parsed by `build()`
    Expression(String),
    /// Arbitrary closure; must not block or mutate anything
    Predicate(GuardFn),
}

impl Guard {
    pub fn expr(source: impl Into<String>) -> Self {
        Self::Expression(source.into())
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Expression(s) => f.debug_tuple("Expression").field(s).finish(),
            Guard::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Guard after validation
#[derive(Clone)]
pub(crate) enum CompiledGuard {
    Expression(Expression),
    Predicate(GuardFn),
}

impl CompiledGuard {
    pub(crate) fn compile(guard: &Guard) -> Result<Self, String> {
        match guard {
            Guard::Expression(source) => condition::parse(source)
                .map(CompiledGuard::Expression)
                .map_err(|e| e.to_string()),
            Guard::Predicate(f) => Ok(CompiledGuard::Predicate(Arc::clone(f))),
        }
    }

    pub(crate) fn evaluate(&self, context: &Context) -> bool {
        match self {
            CompiledGuard::Expression(expr) => condition::evaluate(expr, context),
            CompiledGuard::Predicate(f) => f(context),
        }
    }
}

/// A directed edge; `guard: None` makes it a plain dependency
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub guard: Option<Guard>,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            guard: None,
        }
    }

    pub fn when(from: impl Into<String>, to: impl Into<String>, guard: Guard) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            guard: Some(guard),
        }
    }
}

/// Declaration of a node before validation
#[derive(Clone)]
pub struct NodeSpec {
    pub id: String,
    pub executor: Arc<dyn AgentExecutor>,
    /// Plain dependencies, all of which must complete
    pub depends_on: Vec<String>,
    /// Overrides `SchedulerConfig::max_retries`
    pub max_retries: Option<u32>,
    /// Higher runs first when several nodes are ready and concurrency is capped
    pub priority: i32,
    /// Context state key -> dot path into this node's output
    pub outputs: HashMap<String, String>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, executor: Arc<dyn AgentExecutor>) -> Self {
        Self {
            id: id.into(),
            executor,
            depends_on: Vec::new(),
            max_retries: None,
            priority: 0,
            outputs: HashMap::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn output(mut self, state_key: impl Into<String>, path: impl Into<String>) -> Self {
        self.outputs.insert(state_key.into(), path.into());
        self
    }
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("id", &self.id)
            .field("executor", &self.executor.name())
            .field("depends_on", &self.depends_on)
            .field("max_retries", &self.max_retries)
            .field("priority", &self.priority)
            .finish()
    }
}
