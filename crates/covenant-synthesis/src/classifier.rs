// crates/covenant-synthesis/src/classifier.rs
// ============================================================================
// Module: Request Classifier
// Description: Complexity classification for synthesis requests.
// Purpose: Pick a default ensemble strategy matched to request complexity.
// Dependencies: covenant-core
// ============================================================================

//! ## Overview
//! Requests are classified by prompt length, context breadth, and declared
//! principle count. Simple requests default to confidence weighting;
//! complex or constitutionally loaded requests escalate to the
//! constitutional-priority strategy so the most compliant model dominates.

// ============================================================================
// SECTION: Imports
// ============================================================================

use covenant_core::EnsembleStrategy;
use covenant_core::SynthesisRequest;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prompt length above which a request is at least moderate.
const MODERATE_PROMPT_CHARS: usize = 500;
/// Prompt length above which a request is complex.
const COMPLEX_PROMPT_CHARS: usize = 2_000;
/// Context keys above which a request escalates one class.
const BROAD_CONTEXT_KEYS: usize = 8;

// ============================================================================
// SECTION: Request Classes
// ============================================================================

/// Complexity class of a synthesis request.
///
/// # Invariants
/// - Ordering is ascending complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    /// Short, narrow request.
    Simple,
    /// Mid-sized request.
    Moderate,
    /// Long or constitutionally loaded request.
    Complex,
}

impl RequestClass {
    /// Default ensemble strategy for the class.
    #[must_use]
    pub const fn default_strategy(self) -> EnsembleStrategy {
        match self {
            Self::Simple => EnsembleStrategy::ConfidenceWeighted,
            Self::Moderate => EnsembleStrategy::WeightedAverage,
            Self::Complex => EnsembleStrategy::ConstitutionalPriority,
        }
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Classifies a synthesis request by prompt size and context breadth.
#[must_use]
pub fn classify_request(request: &SynthesisRequest) -> RequestClass {
    let mut class = if request.prompt.len() > COMPLEX_PROMPT_CHARS {
        RequestClass::Complex
    } else if request.prompt.len() > MODERATE_PROMPT_CHARS {
        RequestClass::Moderate
    } else {
        RequestClass::Simple
    };

    if request.context.len() > BROAD_CONTEXT_KEYS {
        class = class.max(RequestClass::Moderate);
    }
    // Constitutionally loaded requests always use the priority strategy.
    if request
        .context
        .get("constitutional_importance")
        .and_then(serde_json::Value::as_f64)
        .is_some_and(|importance| importance > 0.8)
    {
        class = RequestClass::Complex;
    }
    class
}

// ============================================================================
// SECTION: Tests
// ============================================================================
