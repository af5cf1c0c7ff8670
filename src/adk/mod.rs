// SPDX-License-Identifier: MIT

pub mod error;
pub mod executor;
pub mod llm;
pub mod model;
