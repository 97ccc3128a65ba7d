// crates/covenant-core/tests/common/mod.rs
// ============================================================================
// Module: Orchestrator Test Stubs
// Description: In-memory stub components for orchestrator integration tests.
// Purpose: Exercise the decision pipeline without real component crates.
// Dependencies: covenant-core, covenant-rules, tokio
// ============================================================================

//! Shared stub implementations of the component interfaces. Stubs are
//! deterministic and fail closed the way real components do.

use std::sync::Mutex;

use async_trait::async_trait;
use covenant_core::AuditEvent;
use covenant_core::AuditEventDraft;
use covenant_core::BundleId;
use covenant_core::BundleVersion;
use covenant_core::ConstitutionalTag;
use covenant_core::DecisionRecord;
use covenant_core::DecisionRequest;
use covenant_core::EnsembleOutcome;
use covenant_core::EnsembleStrategy;
use covenant_core::ExecutionResult;
use covenant_core::ExecutionSpec;
use covenant_core::ExecutionState;
use covenant_core::HashDigest;
use covenant_core::Obligation;
use covenant_core::ObligationStatus;
use covenant_core::PropertyId;
use covenant_core::ResourceUsage;
use covenant_core::RuleId;
use covenant_core::SynthesisRequest;
use covenant_core::Timestamp;
use covenant_core::VerificationReport;
use covenant_core::VerificationTier;
use covenant_core::Violation;
use covenant_core::core::hashing::chain_digest;
use covenant_core::interfaces::ArmSelection;
use covenant_core::interfaces::AuditError;
use covenant_core::interfaces::AuditSink;
use covenant_core::interfaces::BanditError;
use covenant_core::interfaces::DecisionOptimizer;
use covenant_core::interfaces::PolicyEngine;
use covenant_core::interfaces::PolicyError;
use covenant_core::interfaces::RuleSourceFile;
use covenant_core::interfaces::SandboxController;
use covenant_core::interfaces::SandboxError;
use covenant_core::interfaces::SynthesisError;
use covenant_core::interfaces::Synthesizer;
use covenant_core::interfaces::VerificationError;
use covenant_core::interfaces::Verifier;
use covenant_rules::Verdict;
use serde_json::Map;
use serde_json::Value;

/// In-memory audit sink that maintains a real hash chain.
#[derive(Default)]
pub struct RecordingAudit {
    /// Committed events in order.
    pub events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAudit {
    /// Returns the committed events.
    pub fn snapshot(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn append(&self, draft: AuditEventDraft) -> Result<HashDigest, AuditError> {
        let mut events = self
            .events
            .lock()
            .map_err(|err| AuditError::AppendFailed(err.to_string()))?;
        let prior = events.last().map_or_else(HashDigest::genesis, |event| event.digest.clone());
        let digest = chain_digest(&prior, &draft.payload, draft.timestamp)
            .map_err(|err| AuditError::AppendFailed(err.to_string()))?;
        let sequence = events.len() as u64 + 1;
        let event = AuditEvent {
            sequence,
            prior_digest: prior,
            timestamp: draft.timestamp,
            actor: draft.actor,
            kind: draft.kind,
            payload: draft.payload,
            digest: digest.clone(),
            tag: draft.tag,
        };
        events.push(event);
        Ok(digest)
    }
}

/// Stub policy engine returning a fixed verdict.
pub struct StubPolicy {
    /// Verdict returned by `evaluate`.
    pub verdict: Verdict,
    /// Bundles staged so far.
    pub staged: Mutex<Vec<BundleId>>,
}

impl StubPolicy {
    /// Creates a stub returning the given verdict.
    pub fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            staged: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PolicyEngine for StubPolicy {
    async fn evaluate(&self, request: &DecisionRequest) -> Result<DecisionRecord, PolicyError> {
        let fingerprint = request
            .fingerprint()
            .map_err(|err| PolicyError::Evaluation(err.to_string()))?;
        let mut record = DecisionRecord {
            fingerprint,
            verdict: self.verdict,
            trace: Vec::new(),
            latency_micros: 180,
            bundle_version: BundleVersion::new(1, "v1"),
            tag: request.tag.clone(),
            decided_at: Timestamp::now(),
            ttl_millis: 60_000,
            integrity: HashDigest::genesis(),
        };
        record.integrity = record
            .compute_integrity()
            .map_err(|err| PolicyError::Evaluation(err.to_string()))?;
        Ok(record)
    }

    async fn stage_bundle(&self, sources: &[RuleSourceFile]) -> Result<BundleId, PolicyError> {
        let bundle_id = BundleId::new(format!("bundle-{}", sources.len()));
        self.staged
            .lock()
            .map_err(|err| PolicyError::Storage(err.to_string()))?
            .push(bundle_id.clone());
        Ok(bundle_id)
    }

    async fn activate(&self, _bundle_id: &BundleId) -> Result<BundleVersion, PolicyError> {
        Ok(BundleVersion::new(2, "v2"))
    }
}

/// Stub verifier returning a uniform obligation status.
pub struct StubVerifier {
    /// Status assigned to every obligation.
    pub status: ObligationStatus,
}

#[async_trait]
impl Verifier for StubVerifier {
    async fn verify(
        &self,
        sources: &[RuleSourceFile],
        properties: &[covenant_core::PropertySpec],
        tier: VerificationTier,
    ) -> Result<VerificationReport, VerificationError> {
        let mut obligations = Vec::new();
        for source in sources {
            for property in properties {
                obligations.push(Obligation {
                    rule_id: RuleId::new(source.name.clone()),
                    property_id: property.property_id.clone(),
                    tier,
                    status: self.status,
                    elapsed_millis: Some(2),
                    evidence: None,
                });
            }
        }
        if obligations.is_empty() {
            obligations.push(Obligation {
                rule_id: RuleId::new("empty"),
                property_id: PropertyId::new("structure"),
                tier,
                status: self.status,
                elapsed_millis: Some(1),
                evidence: None,
            });
        }
        let aggregate = VerificationReport::merge_statuses(&obligations);
        Ok(VerificationReport {
            tier,
            obligations,
            aggregate,
            total_millis: 4,
            cache_hits: 0,
            tag: ConstitutionalTag::deployment_default(),
        })
    }
}

/// Stub synthesizer returning a fixed outcome or error.
pub struct StubSynthesizer {
    /// Compliance score reported on outcomes.
    pub compliance: f64,
    /// Reliability score reported on outcomes.
    pub reliability: f64,
    /// When set, `synthesise` fails with an insufficient ensemble.
    pub fail_insufficient: bool,
}

#[async_trait]
impl Synthesizer for StubSynthesizer {
    async fn synthesise(
        &self,
        request: &SynthesisRequest,
    ) -> Result<EnsembleOutcome, SynthesisError> {
        if self.fail_insufficient {
            return Err(SynthesisError::InsufficientEnsemble {
                responded: 1,
                required: 2,
            });
        }
        Ok(EnsembleOutcome {
            candidate_id: request.candidate_id.clone(),
            strategy: EnsembleStrategy::ConfidenceWeighted,
            content: concat!(
                "package synthesized.policy\n",
                "constitution \"cdd01ef066bc6cf2\"\n",
                "default require_review\n\n",
                "allow {\n    compliance >= 0.95\n}\n",
            )
            .to_string(),
            responses: Vec::new(),
            confidence: 0.9,
            compliance: self.compliance,
            reliability: self.reliability,
            bias_before: covenant_core::BiasVector::default(),
            bias_after: covenant_core::BiasVector::default(),
            unresolved_bias: Vec::new(),
            review_recommended: self.compliance < 0.95,
            completed_at: Timestamp::now(),
            tag: request.tag.clone(),
        })
    }
}

/// Stub optimizer recording observations.
#[derive(Default)]
pub struct RecordingOptimizer {
    /// Observed (arm, reward) pairs.
    pub observations: Mutex<Vec<(String, f64)>>,
}

#[async_trait]
impl DecisionOptimizer for RecordingOptimizer {
    async fn select(
        &self,
        _context: &Map<String, Value>,
        arms: &[covenant_core::ArmId],
    ) -> Result<ArmSelection, BanditError> {
        arms.first().map_or(Err(BanditError::NoSafeArm), |arm| {
            Ok(ArmSelection {
                arm_id: arm.clone(),
                fallback: false,
            })
        })
    }

    async fn observe(
        &self,
        arm_id: &covenant_core::ArmId,
        reward: f64,
        _context: &Map<String, Value>,
        tag: &ConstitutionalTag,
    ) -> Result<(), BanditError> {
        if *tag != ConstitutionalTag::deployment_default() {
            return Err(BanditError::ConstitutionalMismatch(tag.to_string()));
        }
        self.observations
            .lock()
            .map_err(|_| BanditError::UnknownArm(arm_id.to_string()))?
            .push((arm_id.to_string(), reward));
        Ok(())
    }
}

/// Stub sandbox returning a configurable result.
pub struct StubSandbox {
    /// Violations attached to every result.
    pub violations: Vec<Violation>,
    /// Whether executions succeed.
    pub success: bool,
}

#[async_trait]
impl SandboxController for StubSandbox {
    async fn execute(&self, spec: ExecutionSpec) -> Result<ExecutionResult, SandboxError> {
        let state = if self.violations.iter().any(|violation| {
            violation.severity == covenant_core::ViolationSeverity::Critical
        }) {
            ExecutionState::Failed
        } else if self.success {
            ExecutionState::Completed
        } else {
            ExecutionState::Failed
        };
        let now = Timestamp::now();
        Ok(ExecutionResult {
            execution_id: spec.execution_id,
            state,
            success: self.success && self.violations.is_empty(),
            output: "ok".to_string(),
            usage: ResourceUsage {
                peak_memory_mib: 32,
                cpu_millis: 10,
                wall_clock_millis: 12,
                disk_written_mib: 0,
            },
            violations: self.violations.clone(),
            cold_start_millis: 40,
            total_millis: 52,
            started_at: now,
            ended_at: now.plus_millis(52),
        })
    }

    async fn cancel(
        &self,
        execution_id: &covenant_core::ExecutionId,
    ) -> Result<(), SandboxError> {
        Err(SandboxError::UnknownExecution(execution_id.to_string()))
    }
}
