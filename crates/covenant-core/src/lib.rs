// crates/covenant-core/src/lib.rs
// ============================================================================
// Module: Covenant Core
// Description: Shared data model, identity, interfaces, and the orchestrator.
// Purpose: Define the canonical types and decision flow for the governance runtime.
// Dependencies: covenant-rules, serde, serde_jcs, sha2, thiserror, time, async-trait
// ============================================================================

//! ## Overview
//! `covenant-core` is the hub of the Covenant governance runtime. It defines
//! the constitutional identity tag and its verification, canonical hashing,
//! the shared record types flowing between components (candidates, decision
//! records, verification reports, audit events, sandbox executions, review
//! requests), the backend-agnostic component interfaces, and the governance
//! orchestrator state machine binding them into one decision pipeline.
//!
//! Concrete component implementations live in sibling crates and are injected
//! into the orchestrator as trait objects; no component holds a pointer back
//! to the orchestrator.

pub mod core;
pub mod interfaces;
pub mod runtime;

pub use crate::core::audit::AuditActor;
pub use crate::core::audit::AuditEvent;
pub use crate::core::audit::AuditEventDraft;
pub use crate::core::audit::AuditEventKind;
pub use crate::core::candidate::Candidate;
pub use crate::core::candidate::CandidateKind;
pub use crate::core::candidate::CandidatePayload;
pub use crate::core::candidate::RiskClass;
pub use crate::core::decision::DecisionRecord;
pub use crate::core::decision::DecisionRequest;
pub use crate::core::decision::EvaluationTrace;
pub use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
pub use crate::core::hashing::HashAlgorithm;
pub use crate::core::hashing::HashDigest;
pub use crate::core::hashing::HashError;
pub use crate::core::hashing::canonical_json_bytes;
pub use crate::core::hashing::hash_bytes;
pub use crate::core::hashing::hash_canonical_json;
pub use crate::core::identifiers::ArmId;
pub use crate::core::identifiers::BundleId;
pub use crate::core::identifiers::BundleVersion;
pub use crate::core::identifiers::CandidateId;
pub use crate::core::identifiers::ExecutionId;
pub use crate::core::identifiers::ModelId;
pub use crate::core::identifiers::PropertyId;
pub use crate::core::identifiers::ReviewId;
pub use crate::core::identifiers::ReviewerId;
pub use crate::core::identifiers::RuleId;
pub use crate::core::identity::CONSTITUTIONAL_TAG_LEN;
pub use crate::core::identity::ConstitutionalTag;
pub use crate::core::identity::DEFAULT_CONSTITUTIONAL_TAG;
pub use crate::core::identity::IdentityError;
pub use crate::core::identity::Stamped;
pub use crate::core::review::ReviewDecision;
pub use crate::core::review::ReviewRequest;
pub use crate::core::review::ReviewStatus;
pub use crate::core::review::ReviewerProfile;
pub use crate::core::sandbox::ExecutionResult;
pub use crate::core::sandbox::ExecutionSpec;
pub use crate::core::sandbox::ExecutionState;
pub use crate::core::sandbox::ResourceCaps;
pub use crate::core::sandbox::ResourceUsage;
pub use crate::core::sandbox::SandboxRuntimeKind;
pub use crate::core::sandbox::Violation;
pub use crate::core::sandbox::ViolationKind;
pub use crate::core::sandbox::ViolationSeverity;
pub use crate::core::synthesis::BiasDimension;
pub use crate::core::synthesis::BiasVector;
pub use crate::core::synthesis::EnsembleOutcome;
pub use crate::core::synthesis::EnsembleStrategy;
pub use crate::core::synthesis::ModelResponse;
pub use crate::core::synthesis::SynthesisRequest;
pub use crate::core::time::Timestamp;
pub use crate::core::verification::Obligation;
pub use crate::core::verification::ObligationStatus;
pub use crate::core::verification::ProofObject;
pub use crate::core::verification::PropertySpec;
pub use crate::core::verification::VerificationReport;
pub use crate::core::verification::VerificationTier;
