// crates/covenant-core/src/runtime/review.rs
// ============================================================================
// Module: Human Review Coordination
// Description: Weighted reviewer assignment and review resolution.
// Purpose: Drive borderline candidates through the human-review branch.
// Dependencies: crate::core::{candidate, identifiers, review, time}, thiserror
// ============================================================================

//! ## Overview
//! Review coordination is pure bookkeeping: reviewer assignment scores a
//! weighted match over expertise overlap, role, historical quality, and
//! current workload; resolution counts approvals, honors rejections
//! immediately, and times out into a safe deny. The orchestrator owns the
//! review records and calls into this module for every state change.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::candidate::Candidate;
use crate::core::identifiers::ReviewId;
use crate::core::identifiers::ReviewerId;
use crate::core::review::ReviewDecision;
use crate::core::review::ReviewFeedback;
use crate::core::review::ReviewRequest;
use crate::core::review::ReviewStatus;
use crate::core::review::ReviewerProfile;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Scoring Weights
// ============================================================================

/// Weight of expertise overlap in the assignment score.
const EXPERTISE_WEIGHT: f64 = 0.4;
/// Weight of role match in the assignment score.
const ROLE_WEIGHT: f64 = 0.2;
/// Weight of historical quality in the assignment score.
const QUALITY_WEIGHT: f64 = 0.25;
/// Weight of available capacity in the assignment score.
const AVAILABILITY_WEIGHT: f64 = 0.15;
/// Role preferred for high-risk candidates.
const SECURITY_ROLE: &str = "security";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while coordinating reviews.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    /// No reviewer had capacity for the assignment.
    #[error("no reviewer with capacity available")]
    NoReviewerAvailable,
    /// Feedback arrived from a reviewer not assigned to the request.
    #[error("reviewer {0} is not assigned to this review")]
    NotAssigned(String),
    /// Feedback arrived after the review reached a terminal status.
    #[error("review is already resolved: {0}")]
    AlreadyResolved(String),
    /// Duplicate feedback from the same reviewer.
    #[error("reviewer {0} already submitted feedback")]
    DuplicateFeedback(String),
}

// ============================================================================
// SECTION: Review Coordinator
// ============================================================================

/// Pure coordinator for review assignment and resolution.
///
/// # Invariants
/// - Holds no mutable state; the orchestrator owns the review records.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewCoordinator;

impl ReviewCoordinator {
    /// Assigns reviewers to a candidate using the weighted match.
    ///
    /// Reviewers without capacity are skipped; the remaining pool is ranked
    /// by the weighted score and the top `count` reviewers are assigned.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::NoReviewerAvailable`] when no reviewer has
    /// capacity.
    pub fn assign(
        &self,
        review_id: ReviewId,
        candidate: &Candidate,
        pool: &[ReviewerProfile],
        required_approvals: u32,
        deadline: Timestamp,
        now: Timestamp,
    ) -> Result<ReviewRequest, ReviewError> {
        let mut ranked: Vec<(f64, &ReviewerProfile)> = pool
            .iter()
            .filter(|profile| profile.has_capacity())
            .map(|profile| (assignment_score(candidate, profile), profile))
            .collect();
        if ranked.is_empty() {
            return Err(ReviewError::NoReviewerAvailable);
        }
        ranked.sort_by(|left, right| {
            right.0.partial_cmp(&left.0).unwrap_or(std::cmp::Ordering::Equal)
        });

        let count = usize::try_from(required_approvals).unwrap_or(usize::MAX).max(1);
        let assigned: Vec<ReviewerId> = ranked
            .iter()
            .take(count)
            .map(|(_, profile)| profile.reviewer_id.clone())
            .collect();

        Ok(ReviewRequest {
            review_id,
            candidate_id: candidate.candidate_id.clone(),
            assigned,
            required_approvals,
            approvals: 0,
            feedback: Vec::new(),
            status: ReviewStatus::Pending,
            deadline,
            created_at: now,
        })
    }

    /// Records one reviewer's feedback and advances the review status.
    ///
    /// Rejections resolve the review immediately; approvals and
    /// modifications accumulate until `required_approvals` is reached.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError`] when the reviewer is not assigned, already
    /// submitted, or the review is terminal.
    pub fn record(
        &self,
        review: &mut ReviewRequest,
        reviewer_id: &ReviewerId,
        decision: ReviewDecision,
        now: Timestamp,
    ) -> Result<ReviewStatus, ReviewError> {
        if review.status.is_terminal() {
            return Err(ReviewError::AlreadyResolved(review.status.as_str().to_string()));
        }
        if !review.assigned.contains(reviewer_id) {
            return Err(ReviewError::NotAssigned(reviewer_id.to_string()));
        }
        if review.feedback.iter().any(|feedback| feedback.reviewer_id == *reviewer_id) {
            return Err(ReviewError::DuplicateFeedback(reviewer_id.to_string()));
        }

        let modified = matches!(decision, ReviewDecision::Modify { .. });
        let rejected = matches!(decision, ReviewDecision::Reject { .. });
        review.feedback.push(ReviewFeedback {
            reviewer_id: reviewer_id.clone(),
            decision,
            submitted_at: now,
        });

        if rejected {
            review.status = ReviewStatus::Rejected;
            return Ok(review.status);
        }

        review.approvals += 1;
        review.status = if review.approvals >= review.required_approvals {
            if modified || has_modification(review) {
                ReviewStatus::Modified
            } else {
                ReviewStatus::Approved
            }
        } else {
            ReviewStatus::InReview
        };
        Ok(review.status)
    }

    /// Applies the deadline policy: an unresolved review past its deadline
    /// times out and resolves as a deny.
    ///
    /// Returns true when the review transitioned to `TimedOut`.
    #[must_use]
    pub fn expire(&self, review: &mut ReviewRequest, now: Timestamp) -> bool {
        if !review.status.is_terminal() && now > review.deadline {
            review.status = ReviewStatus::TimedOut;
            true
        } else {
            false
        }
    }
}

// ============================================================================
// SECTION: Scoring Helpers
// ============================================================================

/// Weighted assignment score for one reviewer against a candidate.
fn assignment_score(candidate: &Candidate, profile: &ReviewerProfile) -> f64 {
    let expertise = expertise_overlap(candidate, profile);
    let role: f64 = if candidate.risk.forces_review() && profile.role == SECURITY_ROLE {
        1.0
    } else {
        0.5
    };
    let capacity_headroom = if profile.max_concurrent == 0 {
        0.0
    } else {
        1.0 - f64::from(profile.workload) / f64::from(profile.max_concurrent)
    };
    expertise.mul_add(
        EXPERTISE_WEIGHT,
        role.mul_add(
            ROLE_WEIGHT,
            profile
                .quality
                .mul_add(QUALITY_WEIGHT, capacity_headroom * AVAILABILITY_WEIGHT),
        ),
    )
}

/// Fraction of candidate principles covered by the reviewer's expertise.
fn expertise_overlap(candidate: &Candidate, profile: &ReviewerProfile) -> f64 {
    if candidate.principles.is_empty() {
        return 0.5;
    }
    let covered = candidate
        .principles
        .iter()
        .filter(|principle| profile.expertise.iter().any(|area| area == *principle))
        .count();
    #[allow(clippy::cast_precision_loss, reason = "principle counts are small")]
    {
        covered as f64 / candidate.principles.len() as f64
    }
}

/// Returns true when any recorded feedback was a modification.
fn has_modification(review: &ReviewRequest) -> bool {
    review
        .feedback
        .iter()
        .any(|feedback| matches!(feedback.decision, ReviewDecision::Modify { .. }))
}
