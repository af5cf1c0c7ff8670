// SPDX-License-Identifier: MIT

//! Orchestration strategies
//!
//! - [`graph`] - explicit dependency graph with guarded edges
//! - [`workflow`] - predecessor-list pipelines on top of the graph scheduler
//! - [`swarm`] - runtime handoff between named executors, bounded by [`SwarmConfig`]

pub mod condition;
pub mod config;
pub mod context;
pub mod graph;
pub mod result;
pub mod swarm;
pub mod workflow;

pub use config::{SchedulerConfig, SwarmConfig};
pub use context::{Context, ContextView};
pub use graph::{DependencyGraph, Edge, GraphScheduler, Guard, NodeSpec};
pub use result::{NodeResult, NodeStatus, OrchestrationResult, RunStatus};
pub use swarm::SwarmCoordinator;
pub use workflow::{Task, WorkflowScheduler};
