// crates/covenant-verify/src/lib.rs
// ============================================================================
// Module: Covenant Verification Pipeline
// Description: Tiered verification of rules against constitutional properties.
// Purpose: Prove, disprove, or surface undecided obligations deterministically.
// Dependencies: covenant-core, covenant-rules, covenant-cache, tokio
// ============================================================================

//! ## Overview
//! Verification runs in three tiers: `automated` structural checks,
//! `semantic` lightweight logical analysis on a worker pool, and `rigorous`
//! constraint translation with a bounded solver. A rule passes only when
//! every (rule, property, tier) obligation reaches `proved`; undecided
//! obligations surface as `unknown` with partial evidence rather than being
//! papered over. Results merge deterministically under the precedence
//! `error > timeout > disproved > unknown > proved`.

pub mod pipeline;
pub mod properties;
pub mod solver;

pub use pipeline::VerificationPipeline;
pub use pipeline::VerificationPipelineConfig;
pub use properties::PropertyCheck;
pub use properties::default_properties;
pub use properties::resolve_check;
pub use solver::Atom;
pub use solver::Conjunction;
pub use solver::NumOp;
pub use solver::SolveOutcome;
pub use solver::solve;
