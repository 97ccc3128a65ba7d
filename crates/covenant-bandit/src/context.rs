// crates/covenant-bandit/src/context.rs
// ============================================================================
// Module: Context Extraction
// Description: Normalized feature vectors from decision contexts.
// Purpose: Map recognized context keys onto a fixed-dimension vector.
// Dependencies: covenant-core, ndarray, serde_json
// ============================================================================

//! ## Overview
//! The bandit consumes a fixed-dimension context vector. Recognized keys
//! map onto normalized features in a stable order; unknown or missing
//! features default to 0.5 (neutral) or 0 (padding). The hour-of-day
//! feature can be pinned via the context for deterministic replays.

// ============================================================================
// SECTION: Imports
// ============================================================================

use covenant_core::Timestamp;
use ndarray::Array1;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Neutral default for recognized-but-absent features.
const NEUTRAL_FEATURE: f64 = 0.5;
/// Normalizer for the principle-count feature.
const PRINCIPLE_COUNT_SCALE: f64 = 10.0;
/// Milliseconds per hour, for the time-of-day feature.
const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;
/// Hours per day.
const HOURS_PER_DAY: i64 = 24;

// ============================================================================
// SECTION: Extraction
// ============================================================================

/// Extracts the normalized context vector at the given dimension.
///
/// Feature order: safety level, constitutional importance, complexity,
/// urgency, stakeholder impact, principle count (scaled), risk level,
/// precedent strength, hour of day, time pressure; remaining slots are
/// zero-padded, extra features are truncated.
#[must_use]
pub fn extract_context(
    context: &Map<String, Value>,
    dimension: usize,
    now: Timestamp,
) -> Array1<f64> {
    let principle_count = context
        .get("principle_count")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    let mut features = vec![
        feature(context, "safety_level"),
        feature(context, "constitutional_importance"),
        feature(context, "complexity_score"),
        feature(context, "urgency"),
        feature(context, "stakeholder_impact"),
        (principle_count / PRINCIPLE_COUNT_SCALE).clamp(0.0, 1.0),
        feature(context, "risk_level"),
        feature(context, "precedent_strength"),
        hour_of_day(context, now),
        feature(context, "time_pressure"),
    ];

    features.resize(dimension, 0.0);
    Array1::from_vec(features)
}

/// Reads a recognized feature, defaulting to neutral.
fn feature(context: &Map<String, Value>, key: &str) -> f64 {
    context
        .get(key)
        .and_then(Value::as_f64)
        .map_or(NEUTRAL_FEATURE, |value| value.clamp(0.0, 1.0))
}

/// Normalized hour of day, overridable via the `hour_of_day` key.
fn hour_of_day(context: &Map<String, Value>, now: Timestamp) -> f64 {
    if let Some(pinned) = context.get("hour_of_day").and_then(Value::as_f64) {
        return (pinned / 24.0).clamp(0.0, 1.0);
    }
    let hours = now.as_unix_millis().div_euclid(MILLIS_PER_HOUR).rem_euclid(HOURS_PER_DAY);
    #[allow(clippy::cast_precision_loss, reason = "hour values are 0..=23")]
    {
        hours as f64 / 24.0
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
