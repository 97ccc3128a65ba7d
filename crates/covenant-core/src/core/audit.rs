// crates/covenant-core/src/core/audit.rs
// ============================================================================
// Module: Audit Event Model
// Description: Hash-chained audit event records and event kinds.
// Purpose: Define the tamper-evident event format every component writes.
// Dependencies: crate::core::{hashing, identity, time}, serde
// ============================================================================

//! ## Overview
//! Audit events form an append-only, hash-chained log. Each event links the
//! prior event's digest and carries its own digest computed as
//! `SHA256(prior_digest ‖ canonical(payload) ‖ timestamp)`. The sequence is
//! strictly monotonic; verification recomputes the chain from genesis.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::chain_digest;
use crate::core::identity::ConstitutionalTag;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Event Kinds
// ============================================================================

/// Kind of audit event, driving retention and alerting policy.
///
/// # Invariants
/// - Variants are stable for serialization and retention matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    /// Candidate lifecycle transition.
    Transition,
    /// Policy decision was produced.
    Decision,
    /// Rule bundle was activated or rolled back.
    BundleSwap,
    /// Verification obligations completed.
    Verification,
    /// Synthesis ensemble completed.
    Synthesis,
    /// Bandit selection fell back below the safety floor.
    SafetyViolation,
    /// Sandbox or ingress security violation.
    SecurityViolation,
    /// Constitutional tag mismatch.
    ConstitutionalViolation,
    /// Cache integrity failure.
    CacheIntegrity,
    /// Human review lifecycle event.
    Review,
    /// Rate-alerting breach notification.
    Alert,
}

impl AuditEventKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transition => "transition",
            Self::Decision => "decision",
            Self::BundleSwap => "bundle_swap",
            Self::Verification => "verification",
            Self::Synthesis => "synthesis",
            Self::SafetyViolation => "safety_violation",
            Self::SecurityViolation => "security_violation",
            Self::ConstitutionalViolation => "constitutional_violation",
            Self::CacheIntegrity => "cache_integrity",
            Self::Review => "review",
            Self::Alert => "alert",
        }
    }

    /// Returns true for kinds retained under the security window.
    #[must_use]
    pub const fn is_security(self) -> bool {
        matches!(self, Self::SecurityViolation | Self::SafetyViolation | Self::CacheIntegrity)
    }

    /// Returns true for kinds retained under the constitutional window.
    #[must_use]
    pub const fn is_constitutional(self) -> bool {
        matches!(self, Self::ConstitutionalViolation | Self::BundleSwap | Self::Review)
    }
}

// ============================================================================
// SECTION: Actors
// ============================================================================

/// Component that originated an audit event.
///
/// # Invariants
/// - Variants are stable for serialization and telemetry labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditActor {
    /// Governance orchestrator.
    Orchestrator,
    /// Policy evaluation engine.
    PolicyEngine,
    /// Formal verification pipeline.
    Verifier,
    /// Synthesis coordinator.
    Synthesizer,
    /// Bandit optimizer.
    Bandit,
    /// Sandbox controller.
    Sandbox,
    /// Decision cache.
    Cache,
    /// Audit log itself (alerts).
    AuditLog,
    /// Ingress surface.
    Ingress,
}

impl AuditActor {
    /// Returns a stable label for the actor.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Orchestrator => "orchestrator",
            Self::PolicyEngine => "policy_engine",
            Self::Verifier => "verifier",
            Self::Synthesizer => "synthesizer",
            Self::Bandit => "bandit",
            Self::Sandbox => "sandbox",
            Self::Cache => "cache",
            Self::AuditLog => "audit_log",
            Self::Ingress => "ingress",
        }
    }
}

// ============================================================================
// SECTION: Event Records
// ============================================================================

/// Draft of an audit event before the log assigns sequence and digests.
///
/// # Invariants
/// - `payload` must be canonicalizable JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEventDraft {
    /// Component that originated the event.
    pub actor: AuditActor,
    /// Event kind.
    pub kind: AuditEventKind,
    /// Structured event payload.
    pub payload: Value,
    /// Event timestamp.
    pub timestamp: Timestamp,
    /// Constitutional tag of the writer.
    pub tag: ConstitutionalTag,
}

/// Committed audit event with sequence and chain digests.
///
/// # Invariants
/// - `sequence` is strictly monotonic within the log.
/// - `digest` equals `chain_digest(prior_digest, payload, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Strictly monotonic sequence number, 1-based.
    pub sequence: u64,
    /// Digest of the prior event (genesis digest for the first event).
    pub prior_digest: HashDigest,
    /// Event timestamp.
    pub timestamp: Timestamp,
    /// Component that originated the event.
    pub actor: AuditActor,
    /// Event kind.
    pub kind: AuditEventKind,
    /// Structured event payload.
    pub payload: Value,
    /// This event's chain digest.
    pub digest: HashDigest,
    /// Constitutional tag of the writer.
    pub tag: ConstitutionalTag,
}

impl AuditEvent {
    /// Recomputes this event's chain digest from its fields.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the payload fails to canonicalize.
    pub fn recompute_digest(&self) -> Result<HashDigest, HashError> {
        chain_digest(&self.prior_digest, &self.payload, self.timestamp)
    }
}
