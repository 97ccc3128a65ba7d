// crates/covenant-bandit/src/lib.rs
// ============================================================================
// Module: Covenant Bandit Optimizer
// Description: Conservative constrained LinUCB with a sliding-window variant.
// Purpose: Select strategy arms under a hard safety floor and audit trail.
// Dependencies: covenant-core, ndarray
// ============================================================================

//! ## Overview
//! The optimizer is a contextual bandit with conservative constraints: an
//! arm is eligible only when its lower confidence bound stays within the
//! safety threshold of the established baseline, and new arms pass the
//! filter only until their sample floor is reached. The baseline is a
//! conservative percentile of a bounded reward window, refreshed
//! periodically. A sliding-window variant adds change detection for
//! non-stationary workloads.

pub mod context;
pub mod linalg;
pub mod linucb;
pub mod window;

pub use context::extract_context;
pub use linalg::solve_linear_system;
pub use linucb::ArmSnapshot;
pub use linucb::ConservativeLinUcb;
pub use linucb::ConservativeLinUcbConfig;
pub use linucb::SelectionOutcome;
pub use window::SlidingWindowUcb;
pub use window::SlidingWindowUcbConfig;
