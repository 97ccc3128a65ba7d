// crates/covenant-synthesis/src/coordinator.rs
// ============================================================================
// Module: Synthesis Coordinator
// Description: Model fan-out, ensemble aggregation, and reliability scoring.
// Purpose: Reconcile a heterogeneous model pool into one auditable outcome.
// Dependencies: crate::{backend, bias, classifier}, covenant-core, tokio
// ============================================================================

//! ## Overview
//! The coordinator dispatches every backend concurrently with a per-call
//! timeout; models that fail or time out are treated as non-responsive and
//! dropped. With two or more responders the ensemble proceeds, otherwise it
//! fails with an insufficient-ensemble error. Aggregation runs after bias
//! mitigation so penalized models influence the final content less; the
//! outcome preserves every model response for audit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use covenant_core::BiasDimension;
use covenant_core::ConstitutionalTag;
use covenant_core::EnsembleOutcome;
use covenant_core::EnsembleStrategy;
use covenant_core::ModelResponse;
use covenant_core::SynthesisRequest;
use covenant_core::Timestamp;
use covenant_core::interfaces::SynthesisError;
use covenant_core::interfaces::Synthesizer;
use tokio::task::JoinSet;
use tracing::debug;

use crate::backend::ModelBackend;
use crate::bias::BiasDetector;
use crate::bias::MitigationReport;
use crate::classifier::RequestClass;
use crate::classifier::classify_request;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Synthesis coordinator configuration.
///
/// # Invariants
/// - `min_models >= 2`; thresholds are in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct SynthesisCoordinatorConfig {
    /// Constitutional tag verified on requests and stamped on outcomes.
    pub tag: ConstitutionalTag,
    /// Default strategy for simple requests.
    pub default_strategy: EnsembleStrategy,
    /// Minimum responders required to proceed.
    pub min_models: usize,
    /// Per-model call timeout.
    pub model_timeout: Duration,
    /// Aggregate compliance required for an unflagged outcome.
    pub unflagged_compliance: f64,
    /// Compliance above which the constitutional-priority model dominates.
    pub priority_threshold: f64,
    /// Per-dimension bias thresholds.
    pub bias_thresholds: BTreeMap<BiasDimension, f64>,
    /// Fail with an error on unresolved bias instead of flagging.
    pub strict_bias: bool,
}

impl Default for SynthesisCoordinatorConfig {
    fn default() -> Self {
        let mut bias_thresholds = BTreeMap::new();
        bias_thresholds.insert(BiasDimension::Demographic, 0.15);
        bias_thresholds.insert(BiasDimension::Cultural, 0.2);
        bias_thresholds.insert(BiasDimension::Linguistic, 0.25);
        bias_thresholds.insert(BiasDimension::Temporal, 0.3);
        bias_thresholds.insert(BiasDimension::Confirmation, 0.2);
        Self {
            tag: ConstitutionalTag::deployment_default(),
            default_strategy: EnsembleStrategy::ConfidenceWeighted,
            min_models: 2,
            model_timeout: Duration::from_secs(10),
            unflagged_compliance: 0.95,
            priority_threshold: 0.9,
            bias_thresholds,
            strict_bias: false,
        }
    }
}

// ============================================================================
// SECTION: Coordinator
// ============================================================================

/// Multi-model synthesis coordinator.
///
/// # Invariants
/// - Backends are opaque; identity and weighting live in configuration.
pub struct SynthesisCoordinator {
    /// Coordinator configuration.
    config: SynthesisCoordinatorConfig,
    /// Model pool.
    backends: Vec<Arc<dyn ModelBackend>>,
    /// Bias detector.
    detector: BiasDetector,
}

impl SynthesisCoordinator {
    /// Creates a coordinator over the given model pool.
    #[must_use]
    pub fn new(
        config: SynthesisCoordinatorConfig,
        backends: Vec<Arc<dyn ModelBackend>>,
    ) -> Self {
        let detector = BiasDetector::new(config.bias_thresholds.clone());
        Self {
            config,
            backends,
            detector,
        }
    }

    /// Runs the full fan-out, mitigation, and aggregation pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError::ConstitutionalMismatch`] for a tag
    /// mismatch, [`SynthesisError::InsufficientEnsemble`] when fewer than
    /// the minimum models respond, and
    /// [`SynthesisError::BiasThresholdExceeded`] in strict-bias mode.
    pub async fn run(&self, request: &SynthesisRequest)
    -> Result<EnsembleOutcome, SynthesisError> {
        if request.tag != self.config.tag {
            return Err(SynthesisError::ConstitutionalMismatch(request.tag.to_string()));
        }

        let responses = self.fan_out(request).await;
        if responses.len() < self.config.min_models {
            return Err(SynthesisError::InsufficientEnsemble {
                responded: responses.len(),
                required: self.config.min_models,
            });
        }

        let uniform = vec![1.0; responses.len()];
        let mitigation = self.detector.run(&responses, &uniform);
        if self.config.strict_bias && !mitigation.unresolved.is_empty() {
            return Err(SynthesisError::BiasThresholdExceeded {
                dimensions: mitigation.unresolved,
            });
        }

        let strategy = self.pick_strategy(request);
        let aggregate = self.aggregate(strategy, &responses, &mitigation.weights);
        let reliability = reliability_score(&aggregate, &mitigation);
        let review_recommended = aggregate.compliance < self.config.unflagged_compliance
            || !mitigation.unresolved.is_empty();

        Ok(EnsembleOutcome {
            candidate_id: request.candidate_id.clone(),
            strategy,
            content: aggregate.content,
            responses,
            confidence: aggregate.confidence,
            compliance: aggregate.compliance,
            reliability,
            bias_before: mitigation.before,
            bias_after: mitigation.after,
            unresolved_bias: mitigation.unresolved,
            review_recommended,
            completed_at: Timestamp::now(),
            tag: self.config.tag.clone(),
        })
    }

    /// Dispatches every backend concurrently, dropping failures.
    async fn fan_out(&self, request: &SynthesisRequest) -> Vec<ModelResponse> {
        let mut join_set: JoinSet<Option<ModelResponse>> = JoinSet::new();
        for backend in &self.backends {
            let backend = Arc::clone(backend);
            let prompt = request.prompt.clone();
            let context = request.context.clone();
            let timeout = self.config.model_timeout;
            join_set.spawn(async move {
                match tokio::time::timeout(timeout, backend.generate(&prompt, &context)).await {
                    Ok(Ok(response)) => Some(response),
                    Ok(Err(err)) => {
                        debug!(model = %backend.model_id(), error = %err, "model call failed");
                        None
                    }
                    Err(_) => {
                        debug!(model = %backend.model_id(), "model call timed out");
                        None
                    }
                }
            });
        }

        let mut responses = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            if let Ok(Some(response)) = joined {
                responses.push(response);
            }
        }
        // Deterministic order regardless of completion order.
        responses.sort_by(|left, right| left.model_id.cmp(&right.model_id));
        responses
    }

    /// Picks the effective strategy for a request.
    fn pick_strategy(&self, request: &SynthesisRequest) -> EnsembleStrategy {
        if let Some(strategy) = request.strategy {
            return strategy;
        }
        let class = classify_request(request);
        if class == RequestClass::Simple {
            self.config.default_strategy
        } else {
            class.default_strategy()
        }
    }

    /// Aggregates responses under the chosen strategy.
    fn aggregate(
        &self,
        strategy: EnsembleStrategy,
        responses: &[ModelResponse],
        weights: &[f64],
    ) -> Aggregate {
        match strategy {
            EnsembleStrategy::MajorityVote => majority_vote(responses, weights),
            EnsembleStrategy::WeightedAverage => weighted_average(responses, weights),
            EnsembleStrategy::ConfidenceWeighted => {
                let adjusted: Vec<f64> = responses
                    .iter()
                    .zip(weights.iter())
                    .map(|(response, weight)| weight * response.confidence.max(0.01))
                    .collect();
                weighted_average(responses, &adjusted)
            }
            EnsembleStrategy::ConstitutionalPriority => {
                let top = responses.iter().zip(weights.iter()).max_by(|(left, _), (right, _)| {
                    left.compliance
                        .partial_cmp(&right.compliance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                match top {
                    Some((leader, _)) if leader.compliance >= self.config.priority_threshold => {
                        // The most compliant model dominates; the rest of the
                        // pool contributes a minority share of the scores.
                        let base = weighted_average(responses, weights);
                        Aggregate {
                            content: leader.content.clone(),
                            confidence: leader
                                .confidence
                                .mul_add(0.7, base.confidence * 0.3),
                            compliance: leader
                                .compliance
                                .mul_add(0.7, base.compliance * 0.3),
                            agreement: base.agreement,
                        }
                    }
                    _ => weighted_average(responses, weights),
                }
            }
        }
    }
}

// ============================================================================
// SECTION: Aggregation
// ============================================================================

/// Intermediate aggregation result.
struct Aggregate {
    /// Reconciled content.
    content: String,
    /// Consensus confidence.
    confidence: f64,
    /// Aggregate compliance.
    compliance: f64,
    /// Weighted share of the dominant content group.
    agreement: f64,
}

/// Plurality vote over normalized content, weighted by mitigation weights.
fn majority_vote(responses: &[ModelResponse], weights: &[f64]) -> Aggregate {
    let mut groups: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for (index, (response, weight)) in responses.iter().zip(weights.iter()).enumerate() {
        let key = normalize_content(&response.content);
        let entry = groups.entry(key).or_insert((0.0, index));
        entry.0 += *weight;
    }
    let total: f64 = weights.iter().sum();
    let winner = groups.values().max_by(|left, right| {
        left.0.partial_cmp(&right.0).unwrap_or(std::cmp::Ordering::Equal)
    });

    winner.map_or_else(
        || weighted_average(responses, weights),
        |(group_weight, representative)| {
            let base = weighted_average(responses, weights);
            let content = responses
                .get(*representative)
                .map_or_else(String::new, |response| response.content.clone());
            Aggregate {
                content,
                confidence: base.confidence,
                compliance: base.compliance,
                agreement: if total > 0.0 { group_weight / total } else { 0.0 },
            }
        },
    )
}

/// Weighted mean of scores; content from the best weighted scorer.
fn weighted_average(responses: &[ModelResponse], weights: &[f64]) -> Aggregate {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || responses.is_empty() {
        return Aggregate {
            content: String::new(),
            confidence: 0.0,
            compliance: 0.0,
            agreement: 0.0,
        };
    }
    let confidence = responses
        .iter()
        .zip(weights.iter())
        .map(|(response, weight)| response.confidence * weight)
        .sum::<f64>()
        / total;
    let compliance = responses
        .iter()
        .zip(weights.iter())
        .map(|(response, weight)| response.compliance * weight)
        .sum::<f64>()
        / total;

    let best = responses.iter().zip(weights.iter()).max_by(|(left, lw), (right, rw)| {
        let left_score = (left.confidence + left.compliance) * **lw;
        let right_score = (right.confidence + right.compliance) * **rw;
        left_score.partial_cmp(&right_score).unwrap_or(std::cmp::Ordering::Equal)
    });
    let content =
        best.map_or_else(String::new, |(response, _)| response.content.clone());

    // Agreement: weighted share of responses matching the chosen content.
    let chosen = normalize_content(&content);
    let matching: f64 = responses
        .iter()
        .zip(weights.iter())
        .filter(|(response, _)| normalize_content(&response.content) == chosen)
        .map(|(_, weight)| *weight)
        .sum();
    Aggregate {
        content,
        confidence,
        compliance,
        agreement: matching / total,
    }
}

/// Normalizes content for agreement grouping.
fn normalize_content(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Reliability: agreement, confidence, and residual bias combined.
fn reliability_score(aggregate: &Aggregate, mitigation: &MitigationReport) -> f64 {
    let residual_bias = BiasDimension::ALL
        .into_iter()
        .map(|dimension| mitigation.after.score(dimension))
        .fold(0.0f64, f64::max);
    (aggregate.agreement.mul_add(0.45, aggregate.confidence * 0.35)
        + (1.0 - residual_bias) * 0.2)
        .clamp(0.0, 1.0)
}

// ============================================================================
// SECTION: Interface Implementation
// ============================================================================

#[async_trait]
impl Synthesizer for SynthesisCoordinator {
    async fn synthesise(&self, request: &SynthesisRequest)
    -> Result<EnsembleOutcome, SynthesisError> {
        self.run(request).await
    }
}
