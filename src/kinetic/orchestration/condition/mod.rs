// SPDX-License-Identifier: MIT

//! Guard expressions for conditional edges
//!
//! Guards are pure predicates over the accumulated context, e.g.:
//! - `classify.output.intent == 'technical'`
//! - `score >= 0.8 and not (review.status == 'failed')`
//! - `tags contains 'urgent' or input contains 'asap'`

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Literal};
pub use evaluator::{evaluate, PathLookup};
pub use parser::parse;
