// crates/covenant-core/src/core/candidate.rs
// ============================================================================
// Module: Governance Candidates
// Description: Immutable candidate records submitted for governance decisions.
// Purpose: Capture the artifact, declared principles, and risk class on ingress.
// Dependencies: crate::core::{identifiers, identity, time}, serde
// ============================================================================

//! ## Overview
//! A candidate is the unit of work flowing through the decision pipeline: a
//! proposed policy, a rule, an agent evolution, or code destined for the
//! sandbox. Candidates are created by the orchestrator on ingress and never
//! mutated; all downstream state lives in the orchestrator's candidate
//! record, not on the candidate itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::identifiers::CandidateId;
use crate::core::identity::ConstitutionalTag;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Candidate Kind
// ============================================================================

/// Kind of artifact submitted for a governance decision.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    /// A proposed policy document.
    Policy,
    /// A declarative rule source.
    Rule,
    /// An agent evolution proposal.
    Evolution,
    /// Code to be executed in the sandbox.
    Code,
}

impl CandidateKind {
    /// Returns a stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Rule => "rule",
            Self::Evolution => "evolution",
            Self::Code => "code",
        }
    }
}

// ============================================================================
// SECTION: Risk Class
// ============================================================================

/// Risk class declared for a candidate, driving verification tier and review.
///
/// # Invariants
/// - Ordering is ascending severity; `High` and `Critical` force human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskClass {
    /// Routine, low-impact change.
    Low,
    /// Moderate-impact change.
    Medium,
    /// High-impact change; always reviewed.
    High,
    /// Critical change; always reviewed.
    Critical,
}

impl RiskClass {
    /// Returns a stable label for the risk class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Returns true when this risk class forces human review.
    #[must_use]
    pub const fn forces_review(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    /// Returns the risk class as a normalized score in `[0, 1]`.
    #[must_use]
    pub const fn score(self) -> f64 {
        match self {
            Self::Low => 0.25,
            Self::Medium => 0.5,
            Self::High => 0.75,
            Self::Critical => 1.0,
        }
    }
}

// ============================================================================
// SECTION: Candidate Payload
// ============================================================================

/// Opaque candidate payload.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
/// - `Empty` candidates are drafted by the synthesis coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidatePayload {
    /// No content yet; synthesis will draft it.
    Empty,
    /// UTF-8 source text (rule sources, code).
    Text {
        /// Payload text.
        content: String,
    },
    /// Structured payload for policies and evolutions.
    Structured {
        /// Payload value.
        value: Value,
    },
}

impl CandidatePayload {
    /// Returns true when the payload carries no content.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns the payload text when present.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text {
                content,
            } => Some(content),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Candidate
// ============================================================================

/// Immutable candidate record created on ingress.
///
/// # Invariants
/// - Never mutated after construction; downstream state lives elsewhere.
/// - `submitter` must match the configured constitutional tag at ingress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique candidate identifier.
    pub candidate_id: CandidateId,
    /// Kind of artifact.
    pub kind: CandidateKind,
    /// Opaque payload.
    pub payload: CandidatePayload,
    /// Constitutional principles the candidate declares it satisfies.
    pub principles: Vec<String>,
    /// Declared risk class.
    pub risk: RiskClass,
    /// Constitutional tag of the submitter.
    pub submitter: ConstitutionalTag,
    /// Submission timestamp.
    pub submitted_at: Timestamp,
    /// Structured request attributes used for policy evaluation.
    pub attributes: Map<String, Value>,
}

impl Candidate {
    /// Returns true when the candidate needs a synthesis pass.
    #[must_use]
    pub const fn needs_synthesis(&self) -> bool {
        self.payload.is_empty()
    }
}
