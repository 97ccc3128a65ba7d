// crates/covenant-core/src/interfaces/mod.rs
// ============================================================================
// Module: Covenant Interfaces
// Description: Backend-agnostic interfaces for governance components.
// Purpose: Define the contract surfaces consumed by the orchestrator.
// Dependencies: crate::core, async-trait, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the orchestrator drives the governance components
//! without embedding implementation details. Every surface is asynchronous:
//! cross-component boundaries are suspension points per the concurrency
//! model. Implementations must fail closed; the identity, audit, and cache
//! layers never recover errors locally.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::audit::AuditEventDraft;
use crate::core::decision::DecisionRecord;
use crate::core::decision::DecisionRequest;
use crate::core::hashing::HashDigest;
use crate::core::identifiers::ArmId;
use crate::core::identifiers::BundleId;
use crate::core::identifiers::BundleVersion;
use crate::core::identifiers::ExecutionId;
use crate::core::identity::ConstitutionalTag;
use crate::core::sandbox::ExecutionResult;
use crate::core::sandbox::ExecutionSpec;
use crate::core::synthesis::BiasDimension;
use crate::core::synthesis::EnsembleOutcome;
use crate::core::synthesis::SynthesisRequest;
use crate::core::verification::PropertySpec;
use crate::core::verification::VerificationReport;
use crate::core::verification::VerificationTier;

// ============================================================================
// SECTION: Rule Sources
// ============================================================================

/// One named rule source file flowing into compilation or verification.
///
/// # Invariants
/// - `name` is unique within a submission and stable for manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSourceFile {
    /// Source file name (manifest key).
    pub name: String,
    /// Rule source text.
    pub content: String,
}

// ============================================================================
// SECTION: Audit Sink
// ============================================================================

/// Audit log errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Append could not be made durable; the originating operation fails.
    #[error("audit append failure: {0}")]
    AppendFailed(String),
    /// Persisted tail diverged from the in-memory chain.
    #[error("audit log broken: {0}")]
    LogBroken(String),
    /// Bounded append channel was full.
    #[error("audit log backpressure: append channel full")]
    Backpressure,
    /// Event carried a mismatched constitutional tag.
    #[error("audit constitutional mismatch: {0}")]
    ConstitutionalMismatch(String),
}

/// Append-only audit sink every component writes to.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends an event and returns its chain digest once durable.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the append cannot be made durable; the
    /// originating operation must then fail.
    async fn append(&self, draft: AuditEventDraft) -> Result<HashDigest, AuditError>;
}

// ============================================================================
// SECTION: Policy Engine
// ============================================================================

/// Policy engine errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Rule sources failed syntactic or semantic validation.
    #[error("rule compilation failed: {detail}")]
    Compilation {
        /// Per-rule failure summary.
        detail: String,
    },
    /// Engine internal failure during evaluation.
    #[error("policy evaluation failed: {0}")]
    Evaluation(String),
    /// Request or bundle carried a mismatched constitutional tag.
    #[error("policy constitutional mismatch: {0}")]
    ConstitutionalMismatch(String),
    /// Unknown bundle identifier.
    #[error("unknown bundle: {0}")]
    UnknownBundle(String),
    /// Evaluation was rate-limited beyond the configured RPS.
    #[error("policy evaluation rate limited")]
    RateLimited,
    /// Bundle storage failure.
    #[error("bundle storage failure: {0}")]
    Storage(String),
}

/// Policy evaluation engine serving decisions over the active bundle.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Evaluates a request against the active bundle.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] on evaluation failure; callers must treat a
    /// failure as `require_review`, never as allow.
    async fn evaluate(&self, request: &DecisionRequest) -> Result<DecisionRecord, PolicyError>;

    /// Compiles and stages rule sources as a pending bundle.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Compilation`] when any source fails validation;
    /// nothing is staged in that case.
    async fn stage_bundle(&self, sources: &[RuleSourceFile]) -> Result<BundleId, PolicyError>;

    /// Activates a staged bundle, retiring the previously active one.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the bundle is unknown or the swap fails.
    async fn activate(&self, bundle_id: &BundleId) -> Result<BundleVersion, PolicyError>;
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Verification pipeline errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling. Timeouts and unknowns
///   are not errors; they surface inside the report.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// Worker pool failed to execute obligations.
    #[error("verification worker failure: {0}")]
    Worker(String),
    /// Request carried a mismatched constitutional tag.
    #[error("verification constitutional mismatch: {0}")]
    ConstitutionalMismatch(String),
}

/// Tiered formal verification pipeline.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Verifies rule sources against properties at the requested tier.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError`] only for infrastructure failures;
    /// undecided obligations surface as `unknown` inside the report.
    async fn verify(
        &self,
        sources: &[RuleSourceFile],
        properties: &[PropertySpec],
        tier: VerificationTier,
    ) -> Result<VerificationReport, VerificationError>;
}

// ============================================================================
// SECTION: Synthesizer
// ============================================================================

/// Synthesis coordinator errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Fewer than the minimum number of models responded.
    #[error("insufficient ensemble: {responded} responded (minimum {required})")]
    InsufficientEnsemble {
        /// Models that responded in time.
        responded: usize,
        /// Minimum responders required to proceed.
        required: usize,
    },
    /// Bias mitigation could not clear every dimension.
    #[error("bias threshold exceeded: {dimensions:?}")]
    BiasThresholdExceeded {
        /// Dimensions still above threshold after mitigation.
        dimensions: Vec<BiasDimension>,
    },
    /// Model backend failure.
    #[error("model backend failure: {0}")]
    Backend(String),
    /// Request carried a mismatched constitutional tag.
    #[error("synthesis constitutional mismatch: {0}")]
    ConstitutionalMismatch(String),
}

/// Multi-model synthesis coordinator.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Drafts content for a candidate via the model ensemble.
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError`] when too few models respond or bias
    /// mitigation fails; partial ensembles of two or more proceed.
    async fn synthesise(&self, request: &SynthesisRequest)
    -> Result<EnsembleOutcome, SynthesisError>;
}

// ============================================================================
// SECTION: Decision Optimizer
// ============================================================================

/// Bandit optimizer errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum BanditError {
    /// No arm satisfied the safety constraint and fallback was disabled.
    #[error("no safe arm available")]
    NoSafeArm,
    /// Update referenced an unknown arm.
    #[error("unknown arm: {0}")]
    UnknownArm(String),
    /// Update carried a mismatched constitutional tag.
    #[error("bandit constitutional mismatch: {0}")]
    ConstitutionalMismatch(String),
}

/// Arm selected by the optimizer, with safety-fallback marking.
///
/// # Invariants
/// - `fallback` is true only when the safety filter rejected every arm and
///   the closest-to-baseline arm was chosen instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmSelection {
    /// Selected arm.
    pub arm_id: ArmId,
    /// True when the selection was a safety fallback.
    pub fallback: bool,
}

/// Constrained contextual bandit selecting among strategy arms.
#[async_trait]
pub trait DecisionOptimizer: Send + Sync {
    /// Selects an arm for the given context among the candidates.
    ///
    /// # Errors
    ///
    /// Returns [`BanditError::NoSafeArm`] when the safety filter rejects
    /// every arm and fallback is disabled.
    async fn select(
        &self,
        context: &Map<String, Value>,
        arms: &[ArmId],
    ) -> Result<ArmSelection, BanditError>;

    /// Records an observed reward for an arm.
    ///
    /// # Errors
    ///
    /// Returns [`BanditError::ConstitutionalMismatch`] when the update tag
    /// differs from the configured tag; the update is rejected.
    async fn observe(
        &self,
        arm_id: &ArmId,
        reward: f64,
        context: &Map<String, Value>,
        tag: &ConstitutionalTag,
    ) -> Result<(), BanditError>;
}

// ============================================================================
// SECTION: Sandbox Controller
// ============================================================================

/// Sandbox controller errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling. Violations are not
///   errors; they surface inside the execution result.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Bounded slot pool admission failed.
    #[error("sandbox pool exhausted")]
    PoolExhausted,
    /// Runtime adapter failure.
    #[error("sandbox runtime failure: {0}")]
    Runtime(String),
    /// Unknown execution identifier.
    #[error("unknown execution: {0}")]
    UnknownExecution(String),
}

/// Hardened sandbox controller for candidate code.
#[async_trait]
pub trait SandboxController: Send + Sync {
    /// Admits and executes a job, enforcing caps and violation policy.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError`] for infrastructure failures; cap breaches
    /// and violations are reported inside the result.
    async fn execute(&self, spec: ExecutionSpec) -> Result<ExecutionResult, SandboxError>;

    /// Cooperatively cancels an execution, killing it after a grace period.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::UnknownExecution`] when the id is not known.
    async fn cancel(&self, execution_id: &ExecutionId) -> Result<(), SandboxError>;
}
