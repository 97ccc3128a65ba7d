// crates/covenant-core/src/core/verification.rs
// ============================================================================
// Module: Verification Model
// Description: Obligations, tiers, proof objects, and aggregate reports.
// Purpose: Capture tiered verification outcomes with deterministic merging.
// Dependencies: crate::core::{hashing, identifiers, identity, time}, serde
// ============================================================================

//! ## Overview
//! Verification decomposes into obligations: one (rule, property, tier)
//! proof task each. Obligation statuses merge deterministically with the
//! precedence `error > timeout > disproved > unknown > proved`; a rule
//! passes only when every obligation reaches `proved`. Proof objects carry
//! an integrity digest over the formal input so cached results can be
//! trusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::PropertyId;
use crate::core::identifiers::RuleId;
use crate::core::identity::ConstitutionalTag;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Tiers
// ============================================================================

/// Verification tier, ascending in cost and strength.
///
/// # Invariants
/// - Ordering is ascending rigor; fallback moves strictly downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationTier {
    /// Structural and schema checks; millisecond-scale, no solver.
    Automated,
    /// Lightweight logical analysis on a worker pool.
    Semantic,
    /// Constraint translation and a bounded proof attempt.
    Rigorous,
}

impl VerificationTier {
    /// Returns a stable label for the tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Automated => "automated",
            Self::Semantic => "semantic",
            Self::Rigorous => "rigorous",
        }
    }
}

// ============================================================================
// SECTION: Properties
// ============================================================================

/// Constitutional property verified against rules.
///
/// # Invariants
/// - `property_id` is unique within a verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySpec {
    /// Property identifier.
    pub property_id: PropertyId,
    /// Human-readable description of the property.
    pub description: String,
    /// True when checking the property requires an existential witness over
    /// numeric domains; such properties are always verified at the rigorous
    /// tier.
    pub requires_numeric_witness: bool,
}

// ============================================================================
// SECTION: Obligations
// ============================================================================

/// Terminal and in-flight states of a verification obligation.
///
/// # Invariants
/// - Variants are stable for serialization; merge precedence is
///   `error > timeout > disproved > unknown > proved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationStatus {
    /// Queued, not yet dispatched.
    Pending,
    /// Dispatched to a worker.
    Running,
    /// Property proved for the rule.
    Proved,
    /// Property disproved; a counter-example exists.
    Disproved,
    /// The tier could not decide within budget.
    Unknown,
    /// The tier timed out.
    Timeout,
    /// The tier failed internally.
    Error,
}

impl ObligationStatus {
    /// Returns a stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Proved => "proved",
            Self::Disproved => "disproved",
            Self::Unknown => "unknown",
            Self::Timeout => "timeout",
            Self::Error => "error",
        }
    }

    /// Merge precedence: higher values dominate when aggregating.
    #[must_use]
    pub const fn precedence(self) -> u8 {
        match self {
            Self::Proved => 0,
            Self::Unknown => 1,
            Self::Disproved => 2,
            Self::Timeout => 3,
            Self::Error => 4,
            Self::Pending | Self::Running => 5,
        }
    }

    /// Returns true for terminal statuses.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// One (rule, property, tier) proof task.
///
/// # Invariants
/// - `status` transitions `pending → running → terminal` and never regresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    /// Rule under verification.
    pub rule_id: RuleId,
    /// Property being checked.
    pub property_id: PropertyId,
    /// Tier the obligation runs at.
    pub tier: VerificationTier,
    /// Current status.
    pub status: ObligationStatus,
    /// Elapsed wall-clock time in milliseconds, once terminal.
    pub elapsed_millis: Option<u64>,
    /// Short evidence note (counter-example summary, timeout detail).
    pub evidence: Option<String>,
}

// ============================================================================
// SECTION: Proof Objects
// ============================================================================

/// Proof object produced by the rigorous tier.
///
/// # Invariants
/// - Exactly one of `steps` / `counter_example` is populated for terminal
///   proved/disproved outcomes.
/// - `input_digest` covers the formal input that was solved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofObject {
    /// Property the proof concerns.
    pub property_id: PropertyId,
    /// Proof steps when the property was proved.
    pub steps: Vec<String>,
    /// Counter-example model when the property was disproved.
    pub counter_example: Option<serde_json::Value>,
    /// Integrity digest over the formal input.
    pub input_digest: HashDigest,
    /// Constitutional tag.
    pub tag: ConstitutionalTag,
    /// Proof generation timestamp.
    pub generated_at: Timestamp,
}

// ============================================================================
// SECTION: Aggregate Reports
// ============================================================================

/// Aggregate verification outcome over all obligations.
///
/// # Invariants
/// - `aggregate` equals the precedence-maximal obligation status, and is
///   `Proved` iff every obligation is `Proved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Tier the request ran at.
    pub tier: VerificationTier,
    /// All obligations with terminal statuses.
    pub obligations: Vec<Obligation>,
    /// Aggregate status under deterministic merge precedence.
    pub aggregate: ObligationStatus,
    /// Total wall-clock duration in milliseconds.
    pub total_millis: u64,
    /// Cache hits among the obligations.
    pub cache_hits: u64,
    /// Constitutional tag.
    pub tag: ConstitutionalTag,
}

impl VerificationReport {
    /// Merges terminal obligation statuses into the aggregate status.
    ///
    /// Returns `Proved` for an empty obligation set: a rule with nothing to
    /// check passes vacuously.
    #[must_use]
    pub fn merge_statuses(obligations: &[Obligation]) -> ObligationStatus {
        obligations
            .iter()
            .map(|obligation| obligation.status)
            .max_by_key(|status| status.precedence())
            .unwrap_or(ObligationStatus::Proved)
    }

    /// Returns true when every obligation reached `Proved`.
    #[must_use]
    pub fn fully_proved(&self) -> bool {
        self.aggregate == ObligationStatus::Proved
    }

    /// Returns true when any obligation ended `Unknown` or `Timeout`.
    #[must_use]
    pub fn has_undecided(&self) -> bool {
        self.obligations.iter().any(|obligation| {
            matches!(obligation.status, ObligationStatus::Unknown | ObligationStatus::Timeout)
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
