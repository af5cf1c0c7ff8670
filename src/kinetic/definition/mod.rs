// SPDX-License-Identifier: MIT

//! Declarative orchestration definitions
//!
//! A YAML file declares agents and one graph, workflow or swarm section;
//! [`Builder`] turns it into a runnable [`Orchestration`].

pub mod builder;
pub mod loader;
pub mod types;

pub use builder::{Builder, EnvModelProvider, ModelProvider, OfflineModelProvider, Orchestration};
pub use loader::DefinitionLoader;
pub use types::OrchestrationDefinition;
