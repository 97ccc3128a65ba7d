// crates/covenant-core/src/core/decision.rs
// ============================================================================
// Module: Policy Decision Records
// Description: Decision requests, justification traces, and cached records.
// Purpose: Capture evaluated verdicts with integrity digests for caching.
// Dependencies: crate::core::{hashing, identifiers, identity, time}, covenant-rules, serde
// ============================================================================

//! ## Overview
//! A decision request fingerprints the candidate attributes being evaluated;
//! the resulting decision record carries the verdict, the justification
//! trace, and an integrity digest so that cached copies can be verified
//! before reuse. A record whose digest fails verification is evicted and
//! recomputed, never served.

// ============================================================================
// SECTION: Imports
// ============================================================================

use covenant_rules::Verdict;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::BundleVersion;
use crate::core::identifiers::RuleId;
use crate::core::identity::ConstitutionalTag;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Decision Request
// ============================================================================

/// Request evaluated against the active rule bundle.
///
/// # Invariants
/// - `attributes` is the complete evaluation input; two requests with equal
///   attributes and action share a fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Action label the request asks about (e.g. `candidate.commit`).
    pub action: String,
    /// Request attributes consumed by rule conditions.
    pub attributes: Map<String, Value>,
    /// Constitutional tag of the requester.
    pub tag: ConstitutionalTag,
}

impl DecisionRequest {
    /// Computes the cache fingerprint for this request.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the request fails to canonicalize.
    pub fn fingerprint(&self) -> Result<HashDigest, HashError> {
        hash_canonical_json(DEFAULT_HASH_ALGORITHM, self)
    }
}

// ============================================================================
// SECTION: Evaluation Trace
// ============================================================================

/// Per-rule entry in the justification trace.
///
/// # Invariants
/// - `winning_clause` is `None` when the rule's default verdict applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationTrace {
    /// Rule that contributed this entry.
    pub rule_id: RuleId,
    /// Verdict the rule produced.
    pub verdict: Verdict,
    /// Winning clause index inside the rule, if any clause fired.
    pub winning_clause: Option<usize>,
    /// True when any condition in the rule evaluated to unknown.
    pub incomplete: bool,
}

// ============================================================================
// SECTION: Decision Record
// ============================================================================

/// Evaluated, cacheable policy decision.
///
/// # Invariants
/// - `integrity` must verify against the record body; mismatches are evicted.
/// - `tag` equals the configured constitutional tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Fingerprint of the evaluated request.
    pub fingerprint: HashDigest,
    /// Final verdict.
    pub verdict: Verdict,
    /// Justification trace: one entry per evaluated rule.
    pub trace: Vec<EvaluationTrace>,
    /// Evaluation latency in microseconds.
    pub latency_micros: u64,
    /// Bundle version that produced the decision.
    pub bundle_version: BundleVersion,
    /// Constitutional tag.
    pub tag: ConstitutionalTag,
    /// Decision timestamp.
    pub decided_at: Timestamp,
    /// Time-to-live for cached copies, in milliseconds.
    pub ttl_millis: u64,
    /// Integrity digest over the record body.
    pub integrity: HashDigest,
}

impl DecisionRecord {
    /// Computes the integrity digest over the record body.
    ///
    /// The digest covers every field except `integrity` itself.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the body fails to canonicalize.
    pub fn compute_integrity(&self) -> Result<HashDigest, HashError> {
        let body = DecisionRecordBody {
            fingerprint: &self.fingerprint,
            verdict: self.verdict,
            trace: &self.trace,
            latency_micros: self.latency_micros,
            bundle_version: &self.bundle_version,
            tag: &self.tag,
            decided_at: self.decided_at,
            ttl_millis: self.ttl_millis,
        };
        hash_canonical_json(DEFAULT_HASH_ALGORITHM, &body)
    }

    /// Verifies the stored integrity digest against the record body.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the body fails to canonicalize; a clean
    /// `Ok(false)` means the digest did not match.
    pub fn verify_integrity(&self) -> Result<bool, HashError> {
        Ok(self.compute_integrity()? == self.integrity)
    }
}

/// Borrowed view of a decision record body used for integrity hashing.
#[derive(Serialize)]
struct DecisionRecordBody<'a> {
    /// Fingerprint of the evaluated request.
    fingerprint: &'a HashDigest,
    /// Final verdict.
    verdict: Verdict,
    /// Justification trace.
    trace: &'a [EvaluationTrace],
    /// Evaluation latency in microseconds.
    latency_micros: u64,
    /// Bundle version that produced the decision.
    bundle_version: &'a BundleVersion,
    /// Constitutional tag.
    tag: &'a ConstitutionalTag,
    /// Decision timestamp.
    decided_at: Timestamp,
    /// Time-to-live for cached copies, in milliseconds.
    ttl_millis: u64,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::DecisionRecord;
    use super::DecisionRequest;
    use crate::core::hashing::HashDigest;
    use crate::core::identifiers::BundleVersion;
    use crate::core::identity::ConstitutionalTag;
    use crate::core::time::Timestamp;

    /// Builds a minimal decision record for integrity tests.
    fn sample_record() -> Result<DecisionRecord, Box<dyn std::error::Error>> {
        let request = DecisionRequest {
            action: "candidate.commit".to_string(),
            attributes: Map::new(),
            tag: ConstitutionalTag::deployment_default(),
        };
        let mut record = DecisionRecord {
            fingerprint: request.fingerprint()?,
            verdict: covenant_rules::Verdict::Allow,
            trace: Vec::new(),
            latency_micros: 420,
            bundle_version: BundleVersion::new(1, "v1"),
            tag: ConstitutionalTag::deployment_default(),
            decided_at: Timestamp::from_unix_millis(1_700_000_000_000),
            ttl_millis: 60_000,
            integrity: HashDigest::genesis(),
        };
        record.integrity = record.compute_integrity()?;
        Ok(record)
    }

    #[test]
    fn integrity_round_trips() -> Result<(), Box<dyn std::error::Error>> {
        let record = sample_record()?;
        assert!(record.verify_integrity()?);
        Ok(())
    }

    #[test]
    fn tampering_breaks_integrity() -> Result<(), Box<dyn std::error::Error>> {
        let mut record = sample_record()?;
        record.verdict = covenant_rules::Verdict::Deny;
        assert!(!record.verify_integrity()?);
        Ok(())
    }

    #[test]
    fn equal_requests_share_a_fingerprint() -> Result<(), Box<dyn std::error::Error>> {
        let tag = ConstitutionalTag::deployment_default();
        let left = DecisionRequest {
            action: "candidate.commit".to_string(),
            attributes: Map::new(),
            tag: tag.clone(),
        };
        let right = DecisionRequest {
            action: "candidate.commit".to_string(),
            attributes: Map::new(),
            tag,
        };
        assert_eq!(left.fingerprint()?, right.fingerprint()?);
        Ok(())
    }
}
