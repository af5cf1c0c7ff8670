// SPDX-License-Identifier: MIT

//! Dependency-graph orchestration
//!
//! Build a [`DependencyGraph`] with [`DependencyGraphBuilder`], then run it
//! with a [`GraphScheduler`].

mod builder;
mod scheduler;
mod types;

pub use builder::{DependencyGraph, DependencyGraphBuilder};
pub use scheduler::GraphScheduler;
pub use types::{Edge, Guard, GuardFn, NodeSpec};
