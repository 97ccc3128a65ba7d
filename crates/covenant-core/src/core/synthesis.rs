// crates/covenant-core/src/core/synthesis.rs
// ============================================================================
// Module: Synthesis Model
// Description: Ensemble strategies, model responses, and bias vectors.
// Purpose: Capture multi-model synthesis outcomes with full audit detail.
// Dependencies: crate::core::{identifiers, identity, time}, serde
// ============================================================================

//! ## Overview
//! The synthesis coordinator fans a request across a model pool and
//! reconciles the responses under an ensemble strategy. The outcome keeps
//! every per-model response for audit, records pre- and post-mitigation
//! bias vectors, and flags results whose aggregate constitutional
//! compliance falls below the unflagged threshold.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::identifiers::CandidateId;
use crate::core::identifiers::ModelId;
use crate::core::identity::ConstitutionalTag;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Ensemble Strategy
// ============================================================================

/// Aggregation strategy applied to model responses.
///
/// # Invariants
/// - Variants are stable for serialization and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleStrategy {
    /// Plurality vote over normalized contents.
    MajorityVote,
    /// Uniform weighted average of scores; content from the best scorer.
    WeightedAverage,
    /// Confidence-weighted aggregation.
    #[default]
    ConfidenceWeighted,
    /// The most constitutionally compliant model dominates above threshold.
    ConstitutionalPriority,
}

impl EnsembleStrategy {
    /// Returns a stable label for the strategy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MajorityVote => "majority_vote",
            Self::WeightedAverage => "weighted_average",
            Self::ConfidenceWeighted => "confidence_weighted",
            Self::ConstitutionalPriority => "constitutional_priority",
        }
    }
}

// ============================================================================
// SECTION: Bias Model
// ============================================================================

/// Bias dimension measured on model outputs.
///
/// # Invariants
/// - Variants are stable for serialization and per-dimension thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasDimension {
    /// Demographic bias.
    Demographic,
    /// Cultural bias.
    Cultural,
    /// Linguistic bias.
    Linguistic,
    /// Temporal bias.
    Temporal,
    /// Confirmation bias.
    Confirmation,
}

impl BiasDimension {
    /// All measured dimensions, in canonical order.
    pub const ALL: [Self; 5] =
        [Self::Demographic, Self::Cultural, Self::Linguistic, Self::Temporal, Self::Confirmation];

    /// Returns a stable label for the dimension.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Demographic => "demographic",
            Self::Cultural => "cultural",
            Self::Linguistic => "linguistic",
            Self::Temporal => "temporal",
            Self::Confirmation => "confirmation",
        }
    }
}

/// Aggregate bias vector over all dimensions.
///
/// # Invariants
/// - Values are in `[0, 1]`; higher means more biased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BiasVector {
    /// Per-dimension bias scores.
    pub scores: BTreeMap<BiasDimension, f64>,
}

impl BiasVector {
    /// Returns the score for a dimension, defaulting to zero.
    #[must_use]
    pub fn score(&self, dimension: BiasDimension) -> f64 {
        self.scores.get(&dimension).copied().unwrap_or(0.0)
    }

    /// Returns the dimensions whose score exceeds the given threshold map.
    #[must_use]
    pub fn breaches(&self, thresholds: &BTreeMap<BiasDimension, f64>) -> Vec<BiasDimension> {
        BiasDimension::ALL
            .into_iter()
            .filter(|dimension| {
                let threshold = thresholds.get(dimension).copied().unwrap_or(1.0);
                self.score(*dimension) > threshold
            })
            .collect()
    }
}

// ============================================================================
// SECTION: Model Responses
// ============================================================================

/// Uniform response produced by a model backend.
///
/// # Invariants
/// - Scores are in `[0, 1]`; `latency_millis` is wall-clock for the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Model that produced the response.
    pub model_id: ModelId,
    /// Generated content.
    pub content: String,
    /// Model self-reported confidence.
    pub confidence: f64,
    /// Constitutional compliance score.
    pub compliance: f64,
    /// Per-dimension bias scores reported for this response.
    pub bias: BiasVector,
    /// Call latency in milliseconds.
    pub latency_millis: u64,
}

// ============================================================================
// SECTION: Requests and Outcomes
// ============================================================================

/// Synthesis request dispatched to the coordinator.
///
/// # Invariants
/// - `context` is an opaque structured map; the coordinator does not
///   interpret unknown keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Candidate the synthesis is drafting for.
    pub candidate_id: CandidateId,
    /// Prompt text.
    pub prompt: String,
    /// Structured prompt context.
    pub context: Map<String, Value>,
    /// Strategy override; the coordinator default applies when absent.
    pub strategy: Option<EnsembleStrategy>,
    /// Constitutional tag of the requester.
    pub tag: ConstitutionalTag,
}

/// Reconciled ensemble outcome.
///
/// # Invariants
/// - `responses` preserves every model response for audit.
/// - `review_recommended` is true whenever `compliance` is below the
///   unflagged threshold or bias mitigation could not clear a dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleOutcome {
    /// Candidate the outcome belongs to.
    pub candidate_id: CandidateId,
    /// Strategy that produced the outcome.
    pub strategy: EnsembleStrategy,
    /// Final reconciled content.
    pub content: String,
    /// Per-model responses preserved for audit.
    pub responses: Vec<ModelResponse>,
    /// Consensus confidence in `[0, 1]`.
    pub confidence: f64,
    /// Aggregate constitutional compliance in `[0, 1]`.
    pub compliance: f64,
    /// Reliability score combining agreement, confidence, and mitigation.
    pub reliability: f64,
    /// Bias vector before mitigation.
    pub bias_before: BiasVector,
    /// Bias vector after mitigation.
    pub bias_after: BiasVector,
    /// Dimensions still above threshold after mitigation.
    pub unresolved_bias: Vec<BiasDimension>,
    /// True when the outcome should be routed to human review.
    pub review_recommended: bool,
    /// Completion timestamp.
    pub completed_at: Timestamp,
    /// Constitutional tag.
    pub tag: ConstitutionalTag,
}
