// crates/covenant-core/tests/review.rs
// ============================================================================
// Module: Review Protocol Tests
// Description: Validate reviewer assignment, approvals, and deadlines.
// Purpose: Ensure the human-review branch resolves safely and fairly.
// Dependencies: covenant-core
// ============================================================================

//! Human-review coordination tests.

use covenant_core::Candidate;
use covenant_core::CandidateId;
use covenant_core::CandidateKind;
use covenant_core::CandidatePayload;
use covenant_core::ConstitutionalTag;
use covenant_core::ReviewDecision;
use covenant_core::ReviewStatus;
use covenant_core::ReviewerId;
use covenant_core::ReviewerProfile;
use covenant_core::RiskClass;
use covenant_core::Timestamp;
use covenant_core::runtime::ReviewCoordinator;
use covenant_core::runtime::ReviewError;
use serde_json::Map;

/// Builds a high-risk candidate declaring safety principles.
fn candidate() -> Candidate {
    Candidate {
        candidate_id: CandidateId::new("cand-r"),
        kind: CandidateKind::Rule,
        payload: CandidatePayload::Empty,
        principles: vec!["safety".to_string(), "fairness".to_string()],
        risk: RiskClass::High,
        submitter: ConstitutionalTag::deployment_default(),
        submitted_at: Timestamp::from_unix_millis(0),
        attributes: Map::new(),
    }
}

/// Builds a reviewer profile.
fn reviewer(
    id: &str,
    expertise: &[&str],
    role: &str,
    quality: f64,
    workload: u32,
    max_concurrent: u32,
) -> ReviewerProfile {
    ReviewerProfile {
        reviewer_id: ReviewerId::new(id),
        expertise: expertise.iter().map(ToString::to_string).collect(),
        role: role.to_string(),
        quality,
        workload,
        max_concurrent,
    }
}

#[test]
fn assignment_prefers_expertise_and_capacity() -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = ReviewCoordinator;
    let pool = vec![
        reviewer("expert", &["safety", "fairness"], "security", 0.9, 0, 3),
        reviewer("busy-expert", &["safety", "fairness"], "security", 0.9, 3, 3),
        reviewer("generalist", &["operations"], "policy", 0.7, 0, 3),
    ];
    let now = Timestamp::from_unix_millis(0);
    let review = coordinator.assign(
        covenant_core::ReviewId::new("rev-1"),
        &candidate(),
        &pool,
        2,
        now.plus_millis(60_000),
        now,
    )?;
    // The saturated expert is skipped entirely; the matched expert ranks
    // above the generalist.
    assert_eq!(review.assigned.len(), 2);
    assert_eq!(review.assigned[0], ReviewerId::new("expert"));
    assert_eq!(review.assigned[1], ReviewerId::new("generalist"));
    assert_eq!(review.status, ReviewStatus::Pending);
    Ok(())
}

#[test]
fn assignment_fails_when_nobody_has_capacity() {
    let coordinator = ReviewCoordinator;
    let pool = vec![reviewer("saturated", &["safety"], "security", 0.9, 2, 2)];
    let now = Timestamp::from_unix_millis(0);
    let result = coordinator.assign(
        covenant_core::ReviewId::new("rev-2"),
        &candidate(),
        &pool,
        1,
        now.plus_millis(60_000),
        now,
    );
    assert_eq!(result.err(), Some(ReviewError::NoReviewerAvailable));
}

#[test]
fn approvals_accumulate_until_the_required_count() -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = ReviewCoordinator;
    let pool = vec![
        reviewer("a", &["safety"], "security", 0.9, 0, 3),
        reviewer("b", &["fairness"], "policy", 0.8, 0, 3),
    ];
    let now = Timestamp::from_unix_millis(0);
    let mut review = coordinator.assign(
        covenant_core::ReviewId::new("rev-3"),
        &candidate(),
        &pool,
        2,
        now.plus_millis(60_000),
        now,
    )?;

    let first =
        coordinator.record(&mut review, &ReviewerId::new("a"), ReviewDecision::Approve, now)?;
    assert_eq!(first, ReviewStatus::InReview);
    assert_eq!(review.approvals, 1);

    let second =
        coordinator.record(&mut review, &ReviewerId::new("b"), ReviewDecision::Approve, now)?;
    assert_eq!(second, ReviewStatus::Approved);
    Ok(())
}

#[test]
fn modify_then_approve_resolves_as_modified() -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = ReviewCoordinator;
    let pool = vec![
        reviewer("a", &["safety"], "security", 0.9, 0, 3),
        reviewer("b", &["fairness"], "policy", 0.8, 0, 3),
    ];
    let now = Timestamp::from_unix_millis(0);
    let mut review = coordinator.assign(
        covenant_core::ReviewId::new("rev-4"),
        &candidate(),
        &pool,
        2,
        now.plus_millis(60_000),
        now,
    )?;

    coordinator.record(
        &mut review,
        &ReviewerId::new("a"),
        ReviewDecision::Modify {
            changes: "tightened the compliance floor".to_string(),
        },
        now,
    )?;
    let status =
        coordinator.record(&mut review, &ReviewerId::new("b"), ReviewDecision::Approve, now)?;
    assert_eq!(status, ReviewStatus::Modified);
    Ok(())
}

#[test]
fn rejection_resolves_immediately() -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = ReviewCoordinator;
    let pool = vec![
        reviewer("a", &["safety"], "security", 0.9, 0, 3),
        reviewer("b", &["fairness"], "policy", 0.8, 0, 3),
    ];
    let now = Timestamp::from_unix_millis(0);
    let mut review = coordinator.assign(
        covenant_core::ReviewId::new("rev-5"),
        &candidate(),
        &pool,
        2,
        now.plus_millis(60_000),
        now,
    )?;

    let status = coordinator.record(
        &mut review,
        &ReviewerId::new("a"),
        ReviewDecision::Reject {
            reason: "conflicts with precedent".to_string(),
        },
        now,
    )?;
    assert_eq!(status, ReviewStatus::Rejected);

    // Terminal reviews accept no further feedback.
    let late =
        coordinator.record(&mut review, &ReviewerId::new("b"), ReviewDecision::Approve, now);
    assert!(matches!(late, Err(ReviewError::AlreadyResolved(_))));
    Ok(())
}

#[test]
fn duplicate_and_unassigned_feedback_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = ReviewCoordinator;
    let pool = vec![
        reviewer("a", &["safety"], "security", 0.9, 0, 3),
        reviewer("b", &["fairness"], "policy", 0.8, 0, 3),
    ];
    let now = Timestamp::from_unix_millis(0);
    let mut review = coordinator.assign(
        covenant_core::ReviewId::new("rev-6"),
        &candidate(),
        &pool,
        2,
        now.plus_millis(60_000),
        now,
    )?;

    coordinator.record(&mut review, &ReviewerId::new("a"), ReviewDecision::Approve, now)?;
    let duplicate =
        coordinator.record(&mut review, &ReviewerId::new("a"), ReviewDecision::Approve, now);
    assert!(matches!(duplicate, Err(ReviewError::DuplicateFeedback(_))));

    let stranger = coordinator.record(
        &mut review,
        &ReviewerId::new("outsider"),
        ReviewDecision::Approve,
        now,
    );
    assert!(matches!(stranger, Err(ReviewError::NotAssigned(_))));
    Ok(())
}

#[test]
fn overdue_reviews_time_out_into_a_safe_deny() -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = ReviewCoordinator;
    let pool = vec![reviewer("a", &["safety"], "security", 0.9, 0, 3)];
    let now = Timestamp::from_unix_millis(0);
    let mut review = coordinator.assign(
        covenant_core::ReviewId::new("rev-7"),
        &candidate(),
        &pool,
        1,
        now.plus_millis(1_000),
        now,
    )?;

    // Before the deadline nothing changes.
    assert!(!coordinator.expire(&mut review, now.plus_millis(500)));
    assert_eq!(review.status, ReviewStatus::Pending);

    // Past the deadline the review times out; expiry is idempotent.
    assert!(coordinator.expire(&mut review, now.plus_millis(1_500)));
    assert_eq!(review.status, ReviewStatus::TimedOut);
    assert!(!coordinator.expire(&mut review, now.plus_millis(2_000)));
    Ok(())
}
