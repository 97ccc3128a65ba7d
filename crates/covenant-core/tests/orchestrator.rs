// crates/covenant-core/tests/orchestrator.rs
// ============================================================================
// Module: Orchestrator Tests
// Description: End-to-end decision-flow tests over stub components.
// Purpose: Validate state transitions, audit coverage, and review branching.
// Dependencies: covenant-core, covenant-rules, tokio
// ============================================================================

//! Integration tests for the governance orchestrator state machine.

mod common;

use std::sync::Arc;

use covenant_core::ArmId;
use covenant_core::AuditEventKind;
use covenant_core::Candidate;
use covenant_core::CandidateId;
use covenant_core::CandidateKind;
use covenant_core::CandidatePayload;
use covenant_core::ConstitutionalTag;
use covenant_core::ObligationStatus;
use covenant_core::PropertyId;
use covenant_core::PropertySpec;
use covenant_core::ResourceCaps;
use covenant_core::ReviewDecision;
use covenant_core::ReviewerId;
use covenant_core::ReviewerProfile;
use covenant_core::RiskClass;
use covenant_core::Timestamp;
use covenant_core::Violation;
use covenant_core::ViolationKind;
use covenant_core::ViolationSeverity;
use covenant_core::runtime::CandidateState;
use covenant_core::runtime::GovernanceOrchestrator;
use covenant_core::runtime::OrchestratorConfig;
use covenant_core::runtime::OrchestratorError;
use covenant_rules::Verdict;
use serde_json::Map;
use serde_json::json;

use common::RecordingAudit;
use common::RecordingOptimizer;
use common::StubPolicy;
use common::StubSandbox;
use common::StubSynthesizer;
use common::StubVerifier;

/// A rule source carrying the deployment constitution tag.
const RULE_SOURCE: &str = r#"
package safety.core
constitution "cdd01ef066bc6cf2"
default require_review

allow {
    compliance >= 0.95
}
"#;

/// Builds a candidate with the given kind, payload, and risk.
fn candidate(kind: CandidateKind, payload: CandidatePayload, risk: RiskClass) -> Candidate {
    let mut attributes = Map::new();
    attributes.insert("compliance".to_string(), json!(0.97));
    Candidate {
        candidate_id: CandidateId::new("cand-1"),
        kind,
        payload,
        principles: vec!["safety".to_string()],
        risk,
        submitter: ConstitutionalTag::deployment_default(),
        submitted_at: Timestamp::now(),
        attributes,
    }
}

/// Default reviewer pool with capacity.
fn reviewers() -> Vec<ReviewerProfile> {
    vec![
        ReviewerProfile {
            reviewer_id: ReviewerId::new("alice"),
            expertise: vec!["safety".to_string()],
            role: "security".to_string(),
            quality: 0.9,
            workload: 0,
            max_concurrent: 3,
        },
        ReviewerProfile {
            reviewer_id: ReviewerId::new("bo"),
            expertise: vec!["policy".to_string()],
            role: "policy".to_string(),
            quality: 0.8,
            workload: 1,
            max_concurrent: 3,
        },
    ]
}

/// Builds an orchestrator over the provided stubs.
fn orchestrator(
    audit: Arc<RecordingAudit>,
    policy: StubPolicy,
    verifier: StubVerifier,
    synthesizer: StubSynthesizer,
    optimizer: Arc<RecordingOptimizer>,
    sandbox: StubSandbox,
) -> GovernanceOrchestrator {
    let config = OrchestratorConfig {
        tag: ConstitutionalTag::deployment_default(),
        reliability_threshold: 0.8,
        required_approvals: 2,
        review_deadline_millis: 60_000,
        properties: vec![PropertySpec {
            property_id: PropertyId::new("no_deadlock"),
            description: "decision clauses terminate".to_string(),
            requires_numeric_witness: false,
        }],
        reviewers: reviewers(),
        sandbox_caps: ResourceCaps::default(),
        outcome_arm: ArmId::new("governance_default"),
    };
    GovernanceOrchestrator::new(
        config,
        audit,
        Arc::new(policy),
        Arc::new(verifier),
        Arc::new(synthesizer),
        optimizer,
        Arc::new(sandbox),
    )
}

#[tokio::test]
async fn happy_path_rule_candidate_commits() -> Result<(), Box<dyn std::error::Error>> {
    let audit = Arc::new(RecordingAudit::default());
    let optimizer = Arc::new(RecordingOptimizer::default());
    let orchestrator = orchestrator(
        Arc::clone(&audit),
        StubPolicy::new(Verdict::Allow),
        StubVerifier {
            status: ObligationStatus::Proved,
        },
        StubSynthesizer {
            compliance: 0.97,
            reliability: 0.95,
            fail_insufficient: false,
        },
        Arc::clone(&optimizer),
        StubSandbox {
            violations: Vec::new(),
            success: true,
        },
    );

    let report = orchestrator
        .submit(candidate(
            CandidateKind::Rule,
            CandidatePayload::Text {
                content: RULE_SOURCE.to_string(),
            },
            RiskClass::Low,
        ))
        .await?;

    assert_eq!(report.state, CandidateState::Committed);
    assert!(report.review.is_none());
    let verification = report.verification.ok_or("missing verification")?;
    assert!(verification.fully_proved());

    // Audit coverage: received, synthesis skip, verification, decision,
    // evaluated transition, approval, bundle swap, committed.
    let events = audit.snapshot();
    assert!(events.len() >= 4);
    assert!(events.iter().any(|event| event.kind == AuditEventKind::BundleSwap));

    // The optimizer saw a full-reward outcome.
    let observations = optimizer.observations.lock().map_err(|err| err.to_string())?;
    assert_eq!(observations.len(), 1);
    assert!((observations[0].1 - 1.0).abs() < f64::EPSILON);
    Ok(())
}

#[tokio::test]
async fn tampered_identifier_fails_before_any_processing()
-> Result<(), Box<dyn std::error::Error>> {
    let audit = Arc::new(RecordingAudit::default());
    let optimizer = Arc::new(RecordingOptimizer::default());
    let orchestrator = orchestrator(
        Arc::clone(&audit),
        StubPolicy::new(Verdict::Allow),
        StubVerifier {
            status: ObligationStatus::Proved,
        },
        StubSynthesizer {
            compliance: 0.97,
            reliability: 0.95,
            fail_insufficient: false,
        },
        optimizer,
        StubSandbox {
            violations: Vec::new(),
            success: true,
        },
    );

    let mut tampered = candidate(
        CandidateKind::Rule,
        CandidatePayload::Text {
            content: RULE_SOURCE.to_string(),
        },
        RiskClass::Low,
    );
    tampered.submitter = ConstitutionalTag::parse("0123456789abcdef")?;

    let result = orchestrator.submit(tampered).await;
    assert!(matches!(result, Err(OrchestratorError::ConstitutionalMismatch(_))));

    // Exactly one audit event, of kind constitutional_violation.
    let events = audit.snapshot();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AuditEventKind::ConstitutionalViolation);
    Ok(())
}

#[tokio::test]
async fn high_risk_candidate_routes_to_review_then_commits()
-> Result<(), Box<dyn std::error::Error>> {
    let audit = Arc::new(RecordingAudit::default());
    let optimizer = Arc::new(RecordingOptimizer::default());
    let orchestrator = orchestrator(
        Arc::clone(&audit),
        StubPolicy::new(Verdict::Allow),
        StubVerifier {
            status: ObligationStatus::Proved,
        },
        StubSynthesizer {
            compliance: 0.88,
            reliability: 0.9,
            fail_insufficient: false,
        },
        optimizer,
        StubSandbox {
            violations: Vec::new(),
            success: true,
        },
    );

    let report = orchestrator
        .submit(candidate(CandidateKind::Rule, CandidatePayload::Empty, RiskClass::High))
        .await?;
    assert_eq!(report.state, CandidateState::InReview);
    let review = report.review.clone().ok_or("missing review request")?;
    assert_eq!(review.assigned.len(), 2);
    assert_eq!(review.required_approvals, 2);

    // Two approvals resolve the review and commit the candidate.
    let first = orchestrator
        .record_review_decision(
            &review.review_id,
            &review.assigned[0],
            ReviewDecision::Approve,
        )
        .await?;
    assert_eq!(first.state, CandidateState::InReview);

    let second = orchestrator
        .record_review_decision(
            &review.review_id,
            &review.assigned[1],
            ReviewDecision::Approve,
        )
        .await?;
    assert_eq!(second.state, CandidateState::Committed);
    Ok(())
}

#[tokio::test]
async fn review_rejection_denies_candidate() -> Result<(), Box<dyn std::error::Error>> {
    let audit = Arc::new(RecordingAudit::default());
    let optimizer = Arc::new(RecordingOptimizer::default());
    let orchestrator = orchestrator(
        Arc::clone(&audit),
        StubPolicy::new(Verdict::RequireReview),
        StubVerifier {
            status: ObligationStatus::Proved,
        },
        StubSynthesizer {
            compliance: 0.97,
            reliability: 0.95,
            fail_insufficient: false,
        },
        optimizer,
        StubSandbox {
            violations: Vec::new(),
            success: true,
        },
    );

    let report = orchestrator
        .submit(candidate(
            CandidateKind::Rule,
            CandidatePayload::Text {
                content: RULE_SOURCE.to_string(),
            },
            RiskClass::Low,
        ))
        .await?;
    assert_eq!(report.state, CandidateState::InReview);
    let review = report.review.ok_or("missing review request")?;

    let resolved = orchestrator
        .record_review_decision(
            &review.review_id,
            &review.assigned[0],
            ReviewDecision::Reject {
                reason: "conflicts with precedent".to_string(),
            },
        )
        .await?;
    assert_eq!(resolved.state, CandidateState::Denied);
    Ok(())
}

#[tokio::test]
async fn review_deadline_expires_into_deny() -> Result<(), Box<dyn std::error::Error>> {
    let audit = Arc::new(RecordingAudit::default());
    let optimizer = Arc::new(RecordingOptimizer::default());
    let orchestrator = orchestrator(
        Arc::clone(&audit),
        StubPolicy::new(Verdict::Allow),
        StubVerifier {
            status: ObligationStatus::Unknown,
        },
        StubSynthesizer {
            compliance: 0.97,
            reliability: 0.95,
            fail_insufficient: false,
        },
        optimizer,
        StubSandbox {
            violations: Vec::new(),
            success: true,
        },
    );

    // Undecided verification routes the candidate to review.
    let report = orchestrator
        .submit(candidate(
            CandidateKind::Rule,
            CandidatePayload::Text {
                content: RULE_SOURCE.to_string(),
            },
            RiskClass::Low,
        ))
        .await?;
    assert_eq!(report.state, CandidateState::InReview);

    let far_future = Timestamp::now().plus_millis(10 * 60_000);
    let expired = orchestrator.expire_reviews(far_future).await?;
    assert_eq!(expired.len(), 1);

    let resolved = orchestrator
        .report(&report.candidate.candidate_id)
        .await
        .ok_or("missing candidate record")?;
    assert_eq!(resolved.state, CandidateState::Denied);
    Ok(())
}

#[tokio::test]
async fn critical_sandbox_violation_blocks_code_candidate()
-> Result<(), Box<dyn std::error::Error>> {
    let audit = Arc::new(RecordingAudit::default());
    let optimizer = Arc::new(RecordingOptimizer::default());
    let orchestrator = orchestrator(
        Arc::clone(&audit),
        StubPolicy::new(Verdict::Allow),
        StubVerifier {
            status: ObligationStatus::Proved,
        },
        StubSynthesizer {
            compliance: 0.97,
            reliability: 0.95,
            fail_insufficient: false,
        },
        optimizer,
        StubSandbox {
            violations: vec![Violation {
                kind: ViolationKind::DangerousSyscall,
                severity: ViolationSeverity::Critical,
                detail: "mount".to_string(),
                detected_at: Timestamp::now(),
            }],
            success: false,
        },
    );

    let report = orchestrator
        .submit(candidate(
            CandidateKind::Code,
            CandidatePayload::Text {
                content: "mount('/', '/host')".to_string(),
            },
            RiskClass::Low,
        ))
        .await?;
    assert_eq!(report.state, CandidateState::Denied);
    let execution = report.execution.ok_or("missing execution result")?;
    assert!(execution.has_critical_violation());
    assert!(execution.usage.wall_clock_millis > 0);

    let events = audit.snapshot();
    assert!(events.iter().any(|event| event.kind == AuditEventKind::SecurityViolation));
    Ok(())
}

#[tokio::test]
async fn insufficient_ensemble_routes_to_review() -> Result<(), Box<dyn std::error::Error>> {
    let audit = Arc::new(RecordingAudit::default());
    let optimizer = Arc::new(RecordingOptimizer::default());
    let orchestrator = orchestrator(
        Arc::clone(&audit),
        StubPolicy::new(Verdict::Allow),
        StubVerifier {
            status: ObligationStatus::Proved,
        },
        StubSynthesizer {
            compliance: 0.97,
            reliability: 0.95,
            fail_insufficient: true,
        },
        optimizer,
        StubSandbox {
            violations: Vec::new(),
            success: true,
        },
    );

    let report = orchestrator
        .submit(candidate(CandidateKind::Policy, CandidatePayload::Empty, RiskClass::Low))
        .await?;
    assert_eq!(report.state, CandidateState::InReview);
    assert!(report.review_reasons.iter().any(|reason| reason.starts_with("synthesis_failed")));
    Ok(())
}

#[tokio::test]
async fn cancellation_rolls_back_in_review_candidate()
-> Result<(), Box<dyn std::error::Error>> {
    let audit = Arc::new(RecordingAudit::default());
    let optimizer = Arc::new(RecordingOptimizer::default());
    let orchestrator = orchestrator(
        Arc::clone(&audit),
        StubPolicy::new(Verdict::RequireReview),
        StubVerifier {
            status: ObligationStatus::Proved,
        },
        StubSynthesizer {
            compliance: 0.97,
            reliability: 0.95,
            fail_insufficient: false,
        },
        optimizer,
        StubSandbox {
            violations: Vec::new(),
            success: true,
        },
    );

    let report = orchestrator
        .submit(candidate(
            CandidateKind::Rule,
            CandidatePayload::Text {
                content: RULE_SOURCE.to_string(),
            },
            RiskClass::Low,
        ))
        .await?;
    assert_eq!(report.state, CandidateState::InReview);

    let cancelled = orchestrator.cancel(&report.candidate.candidate_id).await?;
    assert_eq!(cancelled.state, CandidateState::RolledBack);
    Ok(())
}

#[tokio::test]
async fn audit_chain_links_every_event() -> Result<(), Box<dyn std::error::Error>> {
    let audit = Arc::new(RecordingAudit::default());
    let optimizer = Arc::new(RecordingOptimizer::default());
    let orchestrator = orchestrator(
        Arc::clone(&audit),
        StubPolicy::new(Verdict::Allow),
        StubVerifier {
            status: ObligationStatus::Proved,
        },
        StubSynthesizer {
            compliance: 0.97,
            reliability: 0.95,
            fail_insufficient: false,
        },
        optimizer,
        StubSandbox {
            violations: Vec::new(),
            success: true,
        },
    );

    orchestrator
        .submit(candidate(
            CandidateKind::Rule,
            CandidatePayload::Text {
                content: RULE_SOURCE.to_string(),
            },
            RiskClass::Low,
        ))
        .await?;

    let events = audit.snapshot();
    assert!(events.len() >= 4);
    for window in events.windows(2) {
        assert_eq!(window[1].prior_digest, window[0].digest);
        assert_eq!(window[1].sequence, window[0].sequence + 1);
        assert_eq!(window[1].recompute_digest()?, window[1].digest);
    }
    Ok(())
}
