// crates/covenant-synthesis/src/bias.rs
// ============================================================================
// Module: Bias Detection and Mitigation
// Description: Aggregate bias measurement with weight-penalty mitigation.
// Purpose: Keep ensemble outputs below per-dimension bias thresholds.
// Dependencies: covenant-core
// ============================================================================

//! ## Overview
//! The detector aggregates per-model bias scores into a weighted vector
//! over five dimensions. Any dimension above its threshold triggers a
//! mitigation pass: the model contributing the most bias on that dimension
//! has its weight halved and the aggregate is recomputed. Both the pre- and
//! post-mitigation vectors are reported; dimensions still above threshold
//! after mitigation are surfaced as unresolved, for review rather than
//! auto-denial.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use covenant_core::BiasDimension;
use covenant_core::BiasVector;
use covenant_core::ModelResponse;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Weight multiplier applied to a model penalized for bias.
const MITIGATION_PENALTY: f64 = 0.5;
/// Mitigation passes attempted per dimension before giving up.
const MAX_MITIGATION_ROUNDS: usize = 3;

// ============================================================================
// SECTION: Mitigation Report
// ============================================================================

/// Outcome of bias detection and mitigation.
///
/// # Invariants
/// - `weights` aligns by index with the responses passed to `run`.
#[derive(Debug, Clone, PartialEq)]
pub struct MitigationReport {
    /// Aggregate bias before mitigation.
    pub before: BiasVector,
    /// Aggregate bias after mitigation.
    pub after: BiasVector,
    /// Final per-response weights after penalties.
    pub weights: Vec<f64>,
    /// Dimensions still above threshold after mitigation.
    pub unresolved: Vec<BiasDimension>,
    /// Number of penalty passes applied.
    pub penalties_applied: usize,
}

// ============================================================================
// SECTION: Bias Detector
// ============================================================================

/// Weighted bias detector with per-dimension thresholds.
///
/// # Invariants
/// - Thresholds are in `[0, 1]`; absent dimensions are unbounded.
#[derive(Debug, Clone)]
pub struct BiasDetector {
    /// Per-dimension thresholds.
    thresholds: BTreeMap<BiasDimension, f64>,
}

impl BiasDetector {
    /// Creates a detector with the given thresholds.
    #[must_use]
    pub const fn new(thresholds: BTreeMap<BiasDimension, f64>) -> Self {
        Self {
            thresholds,
        }
    }

    /// Runs detection and mitigation over responses with initial weights.
    #[must_use]
    pub fn run(&self, responses: &[ModelResponse], initial_weights: &[f64]) -> MitigationReport {
        let mut weights: Vec<f64> = responses
            .iter()
            .enumerate()
            .map(|(index, _)| initial_weights.get(index).copied().unwrap_or(1.0))
            .collect();

        let before = aggregate(responses, &weights);
        let mut after = before.clone();
        let mut penalties_applied = 0;

        for _ in 0 .. MAX_MITIGATION_ROUNDS {
            let breaches = after.breaches(&self.thresholds);
            if breaches.is_empty() {
                break;
            }
            let mut penalized = false;
            for dimension in breaches {
                if let Some(index) = worst_contributor(responses, &weights, dimension) {
                    if let Some(weight) = weights.get_mut(index) {
                        *weight *= MITIGATION_PENALTY;
                        penalties_applied += 1;
                        penalized = true;
                    }
                }
            }
            if !penalized {
                break;
            }
            after = aggregate(responses, &weights);
        }

        let unresolved = after.breaches(&self.thresholds);
        MitigationReport {
            before,
            after,
            weights,
            unresolved,
            penalties_applied,
        }
    }
}

// ============================================================================
// SECTION: Aggregation Helpers
// ============================================================================

/// Weighted mean bias per dimension across responses.
fn aggregate(responses: &[ModelResponse], weights: &[f64]) -> BiasVector {
    let mut vector = BiasVector::default();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return vector;
    }
    for dimension in BiasDimension::ALL {
        let weighted: f64 = responses
            .iter()
            .zip(weights.iter())
            .map(|(response, weight)| response.bias.score(dimension) * weight)
            .sum();
        vector.scores.insert(dimension, weighted / total);
    }
    vector
}

/// Index of the response contributing the most weighted bias on a
/// dimension.
fn worst_contributor(
    responses: &[ModelResponse],
    weights: &[f64],
    dimension: BiasDimension,
) -> Option<usize> {
    responses
        .iter()
        .zip(weights.iter())
        .enumerate()
        .max_by(|(_, (left, lw)), (_, (right, rw))| {
            let left_score = left.bias.score(dimension) * **lw;
            let right_score = right.bias.score(dimension) * **rw;
            left_score.partial_cmp(&right_score).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(index, _)| index)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
