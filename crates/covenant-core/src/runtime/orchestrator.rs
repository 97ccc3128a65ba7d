// crates/covenant-core/src/runtime/orchestrator.rs
// ============================================================================
// Module: Governance Orchestrator
// Description: Top-level candidate state machine binding all components.
// Purpose: Drive candidates through synthesis, verification, evaluation,
//          review, and commit with full audit coverage.
// Dependencies: crate::{core, interfaces, runtime::review}, serde_json, tokio
// ============================================================================

//! ## Overview
//! The orchestrator is the single canonical decision path. Each candidate
//! moves through `received → synthesised → verified → evaluated →
//! {approved | denied | in_review} → committed | rolled_back`; every
//! transition writes an audit event before the next step proceeds, so a
//! failed audit append fails the operation that caused it. Components are
//! injected as trait objects; candidates are processed concurrently but each
//! candidate's lifecycle is strictly ordered.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use covenant_rules::Verdict;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use crate::core::audit::AuditActor;
use crate::core::audit::AuditEventDraft;
use crate::core::audit::AuditEventKind;
use crate::core::candidate::Candidate;
use crate::core::candidate::CandidateKind;
use crate::core::candidate::CandidatePayload;
use crate::core::candidate::RiskClass;
use crate::core::decision::DecisionRecord;
use crate::core::decision::DecisionRequest;
use crate::core::identifiers::ArmId;
use crate::core::identifiers::CandidateId;
use crate::core::identifiers::ExecutionId;
use crate::core::identifiers::ReviewId;
use crate::core::identifiers::ReviewerId;
use crate::core::identity::ConstitutionalTag;
use crate::core::review::ReviewDecision;
use crate::core::review::ReviewRequest;
use crate::core::review::ReviewStatus;
use crate::core::review::ReviewerProfile;
use crate::core::sandbox::ExecutionResult;
use crate::core::sandbox::ExecutionSpec;
use crate::core::sandbox::ResourceCaps;
use crate::core::sandbox::SandboxRuntimeKind;
use crate::core::synthesis::EnsembleOutcome;
use crate::core::synthesis::SynthesisRequest;
use crate::core::time::Timestamp;
use crate::core::verification::ObligationStatus;
use crate::core::verification::PropertySpec;
use crate::core::verification::VerificationReport;
use crate::core::verification::VerificationTier;
use crate::interfaces::AuditError;
use crate::interfaces::AuditSink;
use crate::interfaces::DecisionOptimizer;
use crate::interfaces::PolicyEngine;
use crate::interfaces::RuleSourceFile;
use crate::interfaces::SandboxController;
use crate::interfaces::Synthesizer;
use crate::interfaces::Verifier;
use crate::runtime::review::ReviewCoordinator;
use crate::runtime::review::ReviewError;

// ============================================================================
// SECTION: Candidate States
// ============================================================================

/// Candidate lifecycle state.
///
/// # Invariants
/// - Transitions follow the pipeline order; terminal states are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateState {
    /// Accepted on ingress.
    Received,
    /// Content drafted by the ensemble (or skipped).
    Synthesised,
    /// Verification obligations completed.
    Verified,
    /// Policy decision produced.
    Evaluated,
    /// Cleared for commit.
    Approved,
    /// Rejected.
    Denied,
    /// Awaiting human review.
    InReview,
    /// Committed (bundle activated or execution admitted).
    Committed,
    /// Compensated after a terminal failure.
    RolledBack,
}

impl CandidateState {
    /// Returns a stable label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Synthesised => "synthesised",
            Self::Verified => "verified",
            Self::Evaluated => "evaluated",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::InReview => "in_review",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Returns true for terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Denied | Self::Committed | Self::RolledBack)
    }
}

/// One logged state transition.
///
/// # Invariants
/// - `seq` is monotonic within a candidate's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Monotonic transition sequence, 1-based.
    pub seq: u64,
    /// State before the transition.
    pub from: CandidateState,
    /// State after the transition.
    pub to: CandidateState,
    /// Transition timestamp.
    pub at: Timestamp,
    /// Short machine-readable note (review reason, failure kind).
    pub note: Option<String>,
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Orchestrator configuration.
///
/// # Invariants
/// - Thresholds are in `[0, 1]`; `required_approvals >= 1`.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Configured constitutional tag verified on every boundary.
    pub tag: ConstitutionalTag,
    /// Minimum ensemble reliability to skip review.
    pub reliability_threshold: f64,
    /// Approvals required for a review to resolve.
    pub required_approvals: u32,
    /// Review deadline offset in milliseconds.
    pub review_deadline_millis: i64,
    /// Constitutional properties verified for every rule candidate.
    pub properties: Vec<PropertySpec>,
    /// Reviewer pool used for assignment.
    pub reviewers: Vec<ReviewerProfile>,
    /// Default resource caps for code candidates.
    pub sandbox_caps: ResourceCaps,
    /// Bandit arm credited with candidate outcomes.
    pub outcome_arm: ArmId,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tag: ConstitutionalTag::deployment_default(),
            reliability_threshold: 0.8,
            required_approvals: 2,
            review_deadline_millis: 24 * 60 * 60 * 1000,
            properties: Vec::new(),
            reviewers: Vec::new(),
            sandbox_caps: ResourceCaps::default(),
            outcome_arm: ArmId::new("governance_default"),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Hard orchestrator failures surfaced to the ingress layer.
///
/// # Invariants
/// - Variants are stable for status-code mapping.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Ingress identity check failed.
    #[error("constitutional mismatch: {0}")]
    ConstitutionalMismatch(String),
    /// Audit append failed; the operation is not acknowledged.
    #[error("audit append failure: {0}")]
    Audit(#[from] AuditError),
    /// Unknown candidate identifier.
    #[error("unknown candidate: {0}")]
    UnknownCandidate(String),
    /// Unknown review identifier.
    #[error("unknown review: {0}")]
    UnknownReview(String),
    /// Review protocol failure.
    #[error("review error: {0}")]
    Review(#[from] ReviewError),
}

// ============================================================================
// SECTION: Candidate Reports
// ============================================================================

/// Full per-candidate record kept by the orchestrator.
///
/// # Invariants
/// - `transitions` is append-only with monotonic `seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    /// The immutable candidate.
    pub candidate: Candidate,
    /// Current lifecycle state.
    pub state: CandidateState,
    /// Logged transitions.
    pub transitions: Vec<TransitionRecord>,
    /// Ensemble outcome when synthesis ran.
    pub synthesis: Option<EnsembleOutcome>,
    /// Verification report when verification ran.
    pub verification: Option<VerificationReport>,
    /// Policy decision when evaluation ran.
    pub decision: Option<DecisionRecord>,
    /// Sandbox execution when the candidate carried code.
    pub execution: Option<ExecutionResult>,
    /// Review request when the candidate went to review.
    pub review: Option<ReviewRequest>,
    /// Reasons the candidate was routed to review.
    pub review_reasons: Vec<String>,
}

impl CandidateReport {
    /// Creates a fresh report in the `Received` state.
    fn new(candidate: Candidate, now: Timestamp) -> Self {
        Self {
            candidate,
            state: CandidateState::Received,
            transitions: vec![TransitionRecord {
                seq: 1,
                from: CandidateState::Received,
                to: CandidateState::Received,
                at: now,
                note: None,
            }],
            synthesis: None,
            verification: None,
            decision: None,
            execution: None,
            review: None,
            review_reasons: Vec::new(),
        }
    }

    /// Appends a transition and updates the current state.
    fn transition(&mut self, to: CandidateState, at: Timestamp, note: Option<String>) {
        let seq = u64::try_from(self.transitions.len()).unwrap_or(u64::MAX).saturating_add(1);
        self.transitions.push(TransitionRecord {
            seq,
            from: self.state,
            to,
            at,
            note,
        });
        self.state = to;
    }
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Top-level governance orchestrator.
///
/// # Invariants
/// - Each candidate's lifecycle is strictly ordered; candidates are
///   processed concurrently only through separate calls.
/// - Every transition is audited before the pipeline proceeds.
pub struct GovernanceOrchestrator {
    /// Orchestrator configuration.
    config: OrchestratorConfig,
    /// Audit sink (component B).
    audit: Arc<dyn AuditSink>,
    /// Policy engine (component D).
    policy: Arc<dyn PolicyEngine>,
    /// Verification pipeline (component E).
    verifier: Arc<dyn Verifier>,
    /// Synthesis coordinator (component F).
    synthesizer: Arc<dyn Synthesizer>,
    /// Bandit optimizer (component G).
    optimizer: Arc<dyn DecisionOptimizer>,
    /// Sandbox controller (component H).
    sandbox: Arc<dyn SandboxController>,
    /// Review coordinator (pure).
    reviews: ReviewCoordinator,
    /// Candidate records keyed by identifier.
    records: Mutex<BTreeMap<CandidateId, CandidateReport>>,
}

impl GovernanceOrchestrator {
    /// Creates an orchestrator over the injected components.
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        audit: Arc<dyn AuditSink>,
        policy: Arc<dyn PolicyEngine>,
        verifier: Arc<dyn Verifier>,
        synthesizer: Arc<dyn Synthesizer>,
        optimizer: Arc<dyn DecisionOptimizer>,
        sandbox: Arc<dyn SandboxController>,
    ) -> Self {
        Self {
            config,
            audit,
            policy,
            verifier,
            synthesizer,
            optimizer,
            sandbox,
            reviews: ReviewCoordinator,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    /// Submits a candidate and drives it to a resting state.
    ///
    /// The resting state is terminal (`committed`, `denied`, `rolled_back`)
    /// or `in_review`, which resolves later through
    /// [`Self::record_review_decision`] or [`Self::expire_reviews`].
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::ConstitutionalMismatch`] on an identity
    /// failure and [`OrchestratorError::Audit`] when an audit append fails.
    pub async fn submit(&self, candidate: Candidate)
    -> Result<CandidateReport, OrchestratorError> {
        let now = Timestamp::now();

        // Identity is checked before anything else runs; a mismatch produces
        // exactly one audit event and no further processing.
        if self.config.tag.require(&candidate.submitter).is_err() {
            self.audit_event(
                AuditActor::Ingress,
                AuditEventKind::ConstitutionalViolation,
                json!({
                    "candidate_id": candidate.candidate_id.as_str(),
                    "submitted_tag": candidate.submitter.as_str(),
                }),
            )
            .await?;
            return Err(OrchestratorError::ConstitutionalMismatch(
                candidate.submitter.as_str().to_string(),
            ));
        }

        let mut report = CandidateReport::new(candidate, now);
        self.audit_transition(&report, "received").await?;

        self.run_synthesis(&mut report).await?;
        if !report.state.is_terminal() {
            self.run_verification(&mut report).await?;
        }
        if !report.state.is_terminal() {
            self.run_evaluation(&mut report).await?;
        }
        if !report.state.is_terminal() {
            self.resolve(&mut report).await?;
        }

        self.observe_outcome(&report).await;

        let stored = report.clone();
        self.records.lock().await.insert(report.candidate.candidate_id.clone(), report);
        Ok(stored)
    }

    /// Returns the current report for a candidate.
    pub async fn report(&self, candidate_id: &CandidateId) -> Option<CandidateReport> {
        self.records.lock().await.get(candidate_id).cloned()
    }

    /// Cancels a candidate, rolling back any non-terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::UnknownCandidate`] when the candidate is
    /// not known, and [`OrchestratorError::Audit`] when the compensating
    /// audit append fails.
    pub async fn cancel(&self, candidate_id: &CandidateId)
    -> Result<CandidateReport, OrchestratorError> {
        let mut records = self.records.lock().await;
        let report = records
            .get_mut(candidate_id)
            .ok_or_else(|| OrchestratorError::UnknownCandidate(candidate_id.to_string()))?;
        if !report.state.is_terminal() {
            report.transition(
                CandidateState::RolledBack,
                Timestamp::now(),
                Some("cancelled".to_string()),
            );
            let snapshot = report.clone();
            drop(records);
            self.audit_transition(&snapshot, "cancelled").await?;
            return Ok(snapshot);
        }
        Ok(report.clone())
    }

    /// Records a reviewer decision against an in-review candidate.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::UnknownReview`] for an unknown review,
    /// [`OrchestratorError::Review`] for protocol violations, and
    /// [`OrchestratorError::Audit`] when auditing fails.
    pub async fn record_review_decision(
        &self,
        review_id: &ReviewId,
        reviewer_id: &ReviewerId,
        decision: ReviewDecision,
    ) -> Result<CandidateReport, OrchestratorError> {
        let now = Timestamp::now();
        let mut records = self.records.lock().await;
        let report = records
            .values_mut()
            .find(|report| {
                report.review.as_ref().is_some_and(|review| review.review_id == *review_id)
            })
            .ok_or_else(|| OrchestratorError::UnknownReview(review_id.to_string()))?;
        let review = report
            .review
            .as_mut()
            .ok_or_else(|| OrchestratorError::UnknownReview(review_id.to_string()))?;

        let status = self.reviews.record(review, reviewer_id, decision, now)?;
        let snapshot_review = review.clone();
        match status {
            ReviewStatus::Approved | ReviewStatus::Modified => {
                report.transition(CandidateState::Approved, now, Some("review_approved".into()));
            }
            ReviewStatus::Rejected => {
                report.transition(CandidateState::Denied, now, Some("review_rejected".into()));
            }
            ReviewStatus::Pending | ReviewStatus::InReview | ReviewStatus::TimedOut => {}
        }
        let mut snapshot = report.clone();
        drop(records);

        self.audit_event(
            AuditActor::Orchestrator,
            AuditEventKind::Review,
            json!({
                "review_id": snapshot_review.review_id.as_str(),
                "candidate_id": snapshot_review.candidate_id.as_str(),
                "status": snapshot_review.status.as_str(),
                "approvals": snapshot_review.approvals,
            }),
        )
        .await?;

        if snapshot.state == CandidateState::Approved {
            self.audit_transition(&snapshot, "review_approved").await?;
            self.commit(&mut snapshot).await?;
            self.observe_outcome(&snapshot).await;
            self.records
                .lock()
                .await
                .insert(snapshot.candidate.candidate_id.clone(), snapshot.clone());
        } else if snapshot.state == CandidateState::Denied {
            self.audit_transition(&snapshot, "review_rejected").await?;
            self.observe_outcome(&snapshot).await;
        }
        Ok(snapshot)
    }

    /// Expires overdue reviews, auto-denying their candidates.
    ///
    /// Returns the candidates whose reviews timed out.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Audit`] when a timeout audit fails.
    pub async fn expire_reviews(&self, now: Timestamp)
    -> Result<Vec<CandidateId>, OrchestratorError> {
        let mut expired = Vec::new();
        let mut records = self.records.lock().await;
        for report in records.values_mut() {
            let Some(review) = report.review.as_mut() else {
                continue;
            };
            if self.reviews.expire(review, now) {
                report.transition(CandidateState::Denied, now, Some("review_timeout".into()));
                expired.push(report.candidate.candidate_id.clone());
            }
        }
        let snapshots: Vec<CandidateReport> = expired
            .iter()
            .filter_map(|candidate_id| records.get(candidate_id).cloned())
            .collect();
        drop(records);
        for snapshot in snapshots {
            self.audit_event(
                AuditActor::Orchestrator,
                AuditEventKind::Review,
                json!({
                    "candidate_id": snapshot.candidate.candidate_id.as_str(),
                    "status": "timed_out",
                }),
            )
            .await?;
            self.observe_outcome(&snapshot).await;
        }
        Ok(expired)
    }

    // ------------------------------------------------------------------
    // Pipeline stages
    // ------------------------------------------------------------------

    /// Runs the synthesis stage when the candidate carries no content.
    async fn run_synthesis(&self, report: &mut CandidateReport)
    -> Result<(), OrchestratorError> {
        let now = Timestamp::now();
        if !report.candidate.needs_synthesis() {
            report.transition(CandidateState::Synthesised, now, Some("skipped".into()));
            self.audit_transition(report, "synthesis_skipped").await?;
            return Ok(());
        }

        let request = SynthesisRequest {
            candidate_id: report.candidate.candidate_id.clone(),
            prompt: format!(
                "draft {} satisfying principles: {}",
                report.candidate.kind.as_str(),
                report.candidate.principles.join(", "),
            ),
            context: report.candidate.attributes.clone(),
            strategy: None,
            tag: self.config.tag.clone(),
        };
        match self.synthesizer.synthesise(&request).await {
            Ok(outcome) => {
                if outcome.review_recommended
                    || outcome.reliability < self.config.reliability_threshold
                {
                    report.review_reasons.push("synthesis_reliability".to_string());
                }
                report.candidate.payload = CandidatePayload::Text {
                    content: outcome.content.clone(),
                };
                self.audit_event(
                    AuditActor::Synthesizer,
                    AuditEventKind::Synthesis,
                    json!({
                        "candidate_id": report.candidate.candidate_id.as_str(),
                        "strategy": outcome.strategy.as_str(),
                        "compliance": outcome.compliance,
                        "reliability": outcome.reliability,
                    }),
                )
                .await?;
                report.synthesis = Some(outcome);
                report.transition(CandidateState::Synthesised, Timestamp::now(), None);
            }
            Err(err) => {
                report.review_reasons.push(format!("synthesis_failed: {err}"));
                report.transition(
                    CandidateState::Synthesised,
                    Timestamp::now(),
                    Some("synthesis_failed".into()),
                );
                self.audit_transition(report, "synthesis_failed").await?;
            }
        }
        Ok(())
    }

    /// Runs tiered verification at the tier implied by the risk class.
    ///
    /// Only rule and policy candidates carry verifiable rule sources; code
    /// and evolution candidates are checked by the sandbox instead.
    async fn run_verification(&self, report: &mut CandidateReport)
    -> Result<(), OrchestratorError> {
        if !matches!(report.candidate.kind, CandidateKind::Rule | CandidateKind::Policy) {
            report.transition(CandidateState::Verified, Timestamp::now(), Some("skipped".into()));
            self.audit_transition(report, "verification_skipped").await?;
            return Ok(());
        }
        let tier = tier_for_risk(report.candidate.risk);
        let sources = rule_sources(&report.candidate);

        match self.verifier.verify(&sources, &self.config.properties, tier).await {
            Ok(outcome) => {
                let disproved = outcome
                    .obligations
                    .iter()
                    .any(|obligation| obligation.status == ObligationStatus::Disproved);
                if outcome.has_undecided() {
                    report.review_reasons.push("verification_undecided".to_string());
                }
                self.audit_event(
                    AuditActor::Verifier,
                    AuditEventKind::Verification,
                    json!({
                        "candidate_id": report.candidate.candidate_id.as_str(),
                        "tier": outcome.tier.as_str(),
                        "aggregate": outcome.aggregate.as_str(),
                        "obligations": outcome.obligations.len(),
                    }),
                )
                .await?;
                report.verification = Some(outcome);
                if disproved {
                    report.transition(
                        CandidateState::Denied,
                        Timestamp::now(),
                        Some("verification_disproved".into()),
                    );
                    self.audit_transition(report, "verification_disproved").await?;
                    return Ok(());
                }
                report.transition(CandidateState::Verified, Timestamp::now(), None);
            }
            Err(err) => {
                report.review_reasons.push(format!("verification_failed: {err}"));
                report.transition(
                    CandidateState::Verified,
                    Timestamp::now(),
                    Some("verification_failed".into()),
                );
                self.audit_transition(report, "verification_failed").await?;
            }
        }
        Ok(())
    }

    /// Runs policy evaluation over the candidate attributes.
    async fn run_evaluation(&self, report: &mut CandidateReport)
    -> Result<(), OrchestratorError> {
        let request = decision_request(&report.candidate, report.synthesis.as_ref(), &self.config);
        match self.policy.evaluate(&request).await {
            Ok(decision) => {
                self.audit_event(
                    AuditActor::PolicyEngine,
                    AuditEventKind::Decision,
                    json!({
                        "candidate_id": report.candidate.candidate_id.as_str(),
                        "verdict": decision.verdict.as_str(),
                        "bundle": decision.bundle_version.to_string(),
                    }),
                )
                .await?;
                match decision.verdict {
                    Verdict::Deny => {
                        report.decision = Some(decision);
                        report.transition(
                            CandidateState::Denied,
                            Timestamp::now(),
                            Some("policy_denied".into()),
                        );
                        self.audit_transition(report, "policy_denied").await?;
                        return Ok(());
                    }
                    Verdict::RequireReview => {
                        report.review_reasons.push("policy_require_review".to_string());
                    }
                    Verdict::Allow => {}
                }
                report.decision = Some(decision);
                report.transition(CandidateState::Evaluated, Timestamp::now(), None);
            }
            Err(err) => {
                // Evaluation failures default to review, never to allow.
                report.review_reasons.push(format!("evaluation_failed: {err}"));
                report.transition(
                    CandidateState::Evaluated,
                    Timestamp::now(),
                    Some("evaluation_failed".into()),
                );
                self.audit_transition(report, "evaluation_failed").await?;
            }
        }
        Ok(())
    }

    /// Resolves an evaluated candidate into review, approval, or commit.
    async fn resolve(&self, report: &mut CandidateReport) -> Result<(), OrchestratorError> {
        let now = Timestamp::now();
        let needs_review =
            !report.review_reasons.is_empty() || report.candidate.risk.forces_review();

        if needs_review {
            let review_id = ReviewId::new(format!("rev-{}", report.candidate.candidate_id));
            let deadline = now.plus_millis(self.config.review_deadline_millis);
            match self.reviews.assign(
                review_id,
                &report.candidate,
                &self.config.reviewers,
                self.config.required_approvals,
                deadline,
                now,
            ) {
                Ok(review) => {
                    self.audit_event(
                        AuditActor::Orchestrator,
                        AuditEventKind::Review,
                        json!({
                            "review_id": review.review_id.as_str(),
                            "candidate_id": report.candidate.candidate_id.as_str(),
                            "assigned": review.assigned.len(),
                            "reasons": report.review_reasons,
                        }),
                    )
                    .await?;
                    report.review = Some(review);
                    report.transition(CandidateState::InReview, now, None);
                    self.audit_transition(report, "in_review").await?;
                }
                Err(ReviewError::NoReviewerAvailable) => {
                    // With nobody to review, the safe resolution is deny.
                    report.transition(
                        CandidateState::Denied,
                        now,
                        Some("no_reviewer_available".into()),
                    );
                    self.audit_transition(report, "no_reviewer_available").await?;
                }
                Err(err) => return Err(err.into()),
            }
            return Ok(());
        }

        report.transition(CandidateState::Approved, now, None);
        self.audit_transition(report, "auto_approved").await?;
        self.commit(report).await
    }

    /// Commits an approved candidate: bundle activation or sandbox admit.
    async fn commit(&self, report: &mut CandidateReport) -> Result<(), OrchestratorError> {
        match report.candidate.kind {
            CandidateKind::Rule | CandidateKind::Policy => {
                let sources = rule_sources(&report.candidate);
                let staged = match self.policy.stage_bundle(&sources).await {
                    Ok(bundle_id) => self.policy.activate(&bundle_id).await.map(|version| {
                        (bundle_id, version)
                    }),
                    Err(err) => Err(err),
                };
                match staged {
                    Ok((bundle_id, version)) => {
                        self.audit_event(
                            AuditActor::PolicyEngine,
                            AuditEventKind::BundleSwap,
                            json!({
                                "candidate_id": report.candidate.candidate_id.as_str(),
                                "bundle_id": bundle_id.as_str(),
                                "version": version.to_string(),
                            }),
                        )
                        .await?;
                        report.transition(CandidateState::Committed, Timestamp::now(), None);
                        self.audit_transition(report, "committed").await?;
                    }
                    Err(err) => {
                        report.transition(
                            CandidateState::RolledBack,
                            Timestamp::now(),
                            Some(format!("commit_failed: {err}")),
                        );
                        self.audit_transition(report, "commit_failed").await?;
                    }
                }
            }
            CandidateKind::Code => {
                let spec = ExecutionSpec {
                    execution_id: ExecutionId::new(format!(
                        "exec-{}",
                        report.candidate.candidate_id
                    )),
                    candidate_id: report.candidate.candidate_id.clone(),
                    runtime: SandboxRuntimeKind::default(),
                    program: report
                        .candidate
                        .payload
                        .as_text()
                        .unwrap_or_default()
                        .to_string(),
                    caps: self.config.sandbox_caps,
                    allow_network: false,
                    allow_writes: false,
                };
                match self.sandbox.execute(spec).await {
                    Ok(result) => {
                        let critical = result.has_critical_violation();
                        if critical {
                            self.audit_event(
                                AuditActor::Sandbox,
                                AuditEventKind::SecurityViolation,
                                json!({
                                    "candidate_id": report.candidate.candidate_id.as_str(),
                                    "execution_id": result.execution_id.as_str(),
                                    "violations": result.violations,
                                }),
                            )
                            .await?;
                        }
                        let success = result.success;
                        report.execution = Some(result);
                        if critical || !success {
                            report.transition(
                                CandidateState::Denied,
                                Timestamp::now(),
                                Some("sandbox_blocked".into()),
                            );
                            self.audit_transition(report, "sandbox_blocked").await?;
                        } else {
                            report.transition(CandidateState::Committed, Timestamp::now(), None);
                            self.audit_transition(report, "committed").await?;
                        }
                    }
                    Err(err) => {
                        report.transition(
                            CandidateState::RolledBack,
                            Timestamp::now(),
                            Some(format!("sandbox_failed: {err}")),
                        );
                        self.audit_transition(report, "sandbox_failed").await?;
                    }
                }
            }
            CandidateKind::Evolution => {
                report.transition(CandidateState::Committed, Timestamp::now(), None);
                self.audit_transition(report, "committed").await?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Audit and observation helpers
    // ------------------------------------------------------------------

    /// Writes a candidate transition to the audit log.
    async fn audit_transition(
        &self,
        report: &CandidateReport,
        note: &str,
    ) -> Result<(), OrchestratorError> {
        self.audit_event(
            AuditActor::Orchestrator,
            AuditEventKind::Transition,
            json!({
                "candidate_id": report.candidate.candidate_id.as_str(),
                "state": report.state.as_str(),
                "note": note,
            }),
        )
        .await
    }

    /// Writes one audit event, failing the operation on append failure.
    async fn audit_event(
        &self,
        actor: AuditActor,
        kind: AuditEventKind,
        payload: Value,
    ) -> Result<(), OrchestratorError> {
        self.audit
            .append(AuditEventDraft {
                actor,
                kind,
                payload,
                timestamp: Timestamp::now(),
                tag: self.config.tag.clone(),
            })
            .await?;
        Ok(())
    }

    /// Feeds the terminal outcome back into the bandit optimizer.
    async fn observe_outcome(&self, report: &CandidateReport) {
        let reward = match report.state {
            CandidateState::Committed => 1.0,
            CandidateState::InReview => 0.5,
            CandidateState::Approved | CandidateState::Evaluated => 0.7,
            _ => 0.0,
        };
        let mut context: Map<String, Value> = report.candidate.attributes.clone();
        context.insert("risk_level".to_string(), json!(report.candidate.risk.score()));
        if let Err(err) = self
            .optimizer
            .observe(&self.config.outcome_arm, reward, &context, &self.config.tag)
            .await
        {
            // Arm feedback is advisory; a rejected update never fails the
            // candidate, but it is worth a warning trace.
            warn!(error = %err, "bandit outcome observation rejected");
        }
    }
}

// ============================================================================
// SECTION: Stage Helpers
// ============================================================================

/// Maps a risk class to the verification tier it requires.
const fn tier_for_risk(risk: RiskClass) -> VerificationTier {
    match risk {
        RiskClass::Low => VerificationTier::Automated,
        RiskClass::Medium => VerificationTier::Semantic,
        RiskClass::High | RiskClass::Critical => VerificationTier::Rigorous,
    }
}

/// Extracts rule source files from a candidate payload.
fn rule_sources(candidate: &Candidate) -> Vec<RuleSourceFile> {
    match candidate.payload.as_text() {
        Some(content) => vec![RuleSourceFile {
            name: format!("{}.rule", candidate.candidate_id),
            content: content.to_string(),
        }],
        None => Vec::new(),
    }
}

/// Builds the decision request evaluated for a candidate.
fn decision_request(
    candidate: &Candidate,
    synthesis: Option<&EnsembleOutcome>,
    config: &OrchestratorConfig,
) -> DecisionRequest {
    let mut attributes = candidate.attributes.clone();
    attributes.insert("kind".to_string(), json!(candidate.kind.as_str()));
    attributes.insert("risk".to_string(), json!(candidate.risk.as_str()));
    attributes.insert("principle_count".to_string(), json!(candidate.principles.len()));
    if let Some(outcome) = synthesis {
        attributes.insert("compliance".to_string(), json!(outcome.compliance));
        attributes.insert("reliability".to_string(), json!(outcome.reliability));
    }
    DecisionRequest {
        action: "candidate.commit".to_string(),
        attributes,
        tag: config.tag.clone(),
    }
}
