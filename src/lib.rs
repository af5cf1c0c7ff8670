// SPDX-License-Identifier: MIT

//! Multi-agent task orchestration
//!
//! - [`adk`] - executor contract, model clients and error types
//! - [`kinetic`] - graph, workflow and swarm orchestration plus declarative definitions

pub mod adk;
pub mod kinetic;
