// crates/covenant-policy/src/lib.rs
// ============================================================================
// Module: Covenant Policy Engine
// Description: Rule compilation, bundle lifecycle, and decision evaluation.
// Purpose: Serve policy verdicts over one active, content-addressed bundle.
// Dependencies: covenant-core, covenant-rules, covenant-cache, tokio
// ============================================================================

//! ## Overview
//! The policy engine compiles rule sources into content-addressed bundles,
//! maintains the single active bundle behind a read-copy-update pointer,
//! and evaluates decision requests in a single pass with a justification
//! trace. Compilation is pure; activation and rollback are atomic swaps
//! that retire the previous bundle while keeping it addressable.

pub mod bundle;
pub mod compile;
pub mod engine;
pub mod telemetry;

pub use bundle::BundleManifest;
pub use bundle::BundleState;
pub use bundle::BundleStore;
pub use bundle::ManifestFile;
pub use compile::CompileOutcome;
pub use compile::RuleValidation;
pub use compile::compile;
pub use engine::PolicyEngineConfig;
pub use engine::PolicyEvaluationEngine;
pub use telemetry::EngineMetricsSnapshot;
