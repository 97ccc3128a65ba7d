// crates/covenant-synthesis/src/lib.rs
// ============================================================================
// Module: Covenant Synthesis Coordinator
// Description: Multi-model ensemble drafting with bias-aware reconciliation.
// Purpose: Fan requests across a model pool and reconcile under a strategy.
// Dependencies: covenant-core, reqwest, tokio
// ============================================================================

//! ## Overview
//! The coordinator fans a synthesis request across a heterogeneous model
//! pool, harvests the responses that arrive within the per-call timeout,
//! and reconciles them under an ensemble strategy. A bias detector measures
//! the aggregate output across five dimensions and penalizes offending
//! models before re-aggregating; both bias vectors are preserved on the
//! outcome. Fewer than the minimum responders fails the request rather than
//! fabricating consensus.

pub mod backend;
pub mod bias;
pub mod classifier;
pub mod coordinator;

pub use backend::HttpModelBackend;
pub use backend::HttpModelConfig;
pub use backend::ModelBackend;
pub use backend::ScriptedBackend;
pub use bias::BiasDetector;
pub use bias::MitigationReport;
pub use classifier::RequestClass;
pub use classifier::classify_request;
pub use coordinator::SynthesisCoordinator;
pub use coordinator::SynthesisCoordinatorConfig;
