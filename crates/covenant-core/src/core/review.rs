// crates/covenant-core/src/core/review.rs
// ============================================================================
// Module: Human Review Model
// Description: Review requests, reviewer profiles, and review decisions.
// Purpose: Capture the optional human-review branch of the decision flow.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A review request exists only when the orchestrator decides a candidate
//! is borderline. Reviewers are assigned by a weighted match over expertise,
//! role, quality, and workload; the request needs a configured number of
//! approvals and times out into a safe deny.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::CandidateId;
use crate::core::identifiers::ReviewId;
use crate::core::identifiers::ReviewerId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Reviewer Profiles
// ============================================================================

/// Reviewer profile used for weighted assignment.
///
/// # Invariants
/// - `quality` is in `[0, 1]`; `workload <= max_concurrent` for assignable
///   reviewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerProfile {
    /// Reviewer identifier.
    pub reviewer_id: ReviewerId,
    /// Expertise areas (matched against candidate principles).
    pub expertise: Vec<String>,
    /// Role label (e.g. `policy`, `security`, `legal`).
    pub role: String,
    /// Historical review quality score in `[0, 1]`.
    pub quality: f64,
    /// Reviews currently assigned.
    pub workload: u32,
    /// Maximum concurrent reviews the reviewer accepts.
    pub max_concurrent: u32,
}

impl ReviewerProfile {
    /// Returns true when the reviewer can accept another assignment.
    #[must_use]
    pub const fn has_capacity(&self) -> bool {
        self.workload < self.max_concurrent
    }
}

// ============================================================================
// SECTION: Review Decisions
// ============================================================================

/// Decision recorded by one reviewer.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Approve the candidate as submitted.
    Approve,
    /// Reject the candidate.
    Reject {
        /// Rejection reason.
        reason: String,
    },
    /// Approve with modifications applied.
    Modify {
        /// Description of the applied modification.
        changes: String,
    },
}

/// Feedback item recorded against a review.
///
/// # Invariants
/// - `submitted_at` falls within the review window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFeedback {
    /// Reviewer that submitted the feedback.
    pub reviewer_id: ReviewerId,
    /// Decision taken.
    pub decision: ReviewDecision,
    /// Submission timestamp.
    pub submitted_at: Timestamp,
}

// ============================================================================
// SECTION: Review Status and Requests
// ============================================================================

/// Lifecycle status of a review request.
///
/// # Invariants
/// - Variants are stable; `TimedOut` resolves as a deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Created, awaiting first reviewer action.
    Pending,
    /// At least one reviewer has responded.
    InReview,
    /// Required approvals reached.
    Approved,
    /// A reviewer rejected the candidate.
    Rejected,
    /// Approved with modifications.
    Modified,
    /// Deadline passed without resolution; treated as deny.
    TimedOut,
}

impl ReviewStatus {
    /// Returns a stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Modified => "modified",
            Self::TimedOut => "timed_out",
        }
    }

    /// Returns true for terminal statuses.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Modified | Self::TimedOut)
    }
}

/// Human review request for a borderline candidate.
///
/// # Invariants
/// - `approvals <= required_approvals` until terminal.
/// - `assigned` reviewers all had capacity at assignment time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    /// Review identifier.
    pub review_id: ReviewId,
    /// Candidate under review.
    pub candidate_id: CandidateId,
    /// Assigned reviewers.
    pub assigned: Vec<ReviewerId>,
    /// Approvals required to resolve the review.
    pub required_approvals: u32,
    /// Approvals received so far.
    pub approvals: u32,
    /// Feedback items received so far.
    pub feedback: Vec<ReviewFeedback>,
    /// Current status.
    pub status: ReviewStatus,
    /// Resolution deadline.
    pub deadline: Timestamp,
    /// Creation timestamp.
    pub created_at: Timestamp,
}
