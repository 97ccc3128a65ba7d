// crates/covenant-rules/src/lib.rs
// ============================================================================
// Module: Covenant Rules
// Description: Structural model, parser, and evaluator for governance rules.
// Purpose: Turn declarative rule sources into validated, evaluable rule values.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! `covenant-rules` models the declarative rule language consumed by the
//! policy engine and the verification pipeline. A rule source declares a
//! package, a constitutional tag, a default verdict, and one or more braced
//! decision clauses. Parsing is bounded and fail-closed; evaluation converts
//! request attributes into tri-state condition outcomes so that missing
//! evidence never silently satisfies a clause.
//!
//! The crate is deliberately dependency-light so it can be consumed by every
//! other Covenant crate without pulling in runtime machinery.

pub mod ast;
pub mod eval;
pub mod parse;
pub mod truth;

pub use ast::Clause;
pub use ast::Comparator;
pub use ast::Condition;
pub use ast::Literal;
pub use ast::Rule;
pub use ast::Verdict;
pub use eval::ClauseOutcome;
pub use eval::RuleOutcome;
pub use eval::evaluate_rule;
pub use parse::ParseError;
pub use parse::parse_rule;
pub use truth::Truth;
