//! In-process Datalog-style reasoning over a [`tern_facts::FactStore`].
//!
//! Rules are pure (no negation) joins and comparisons over base and
//! derived facts, loaded from [`stdlib::DEFAULT_PROGRAM`] plus whatever
//! `mangle.schema_path` supplies, and evaluated to a fixpoint on demand by
//! [`engine::ReasoningEngine`]. A handful of derivations that need a
//! fact's own timestamp as a temporal-proximity key rather than one of
//! its declared args live in [`native`] instead of rule text.

pub mod engine;
mod error;
mod native;
mod parser;
pub mod stdlib;
pub mod types;

pub use engine::ReasoningEngine;
pub use error::ReasonError;
pub use parser::{parse_goal, parse_rule};
pub use types::{ArithOp, BodyTerm, CompareOp, Comparison, Goal, Literal, Row, Rule, Term};
