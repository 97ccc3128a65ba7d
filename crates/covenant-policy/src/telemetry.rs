// crates/covenant-policy/src/telemetry.rs
// ============================================================================
// Module: Policy Engine Telemetry
// Description: Latency buckets and verdict counters for evaluation.
// Purpose: Provide metric snapshots without hard observability deps.
// Dependencies: covenant-rules, serde
// ============================================================================

//! ## Overview
//! This module exposes a thin metrics surface for evaluation counters and
//! latency histograms. It is intentionally dependency-light so deployments
//! can export to Prometheus or OpenTelemetry without redesign.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use covenant_rules::Verdict;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Latency buckets in microseconds for evaluation histograms.
///
/// The first buckets sit under the strict 5 ms target so tail regressions
/// show up before the target is breached.
pub const EVAL_LATENCY_BUCKETS_US: &[u64] =
    &[100, 250, 500, 1_000, 2_500, 5_000, 10_000, 50_000, 100_000, 500_000];

// ============================================================================
// SECTION: Metrics
// ============================================================================

/// Atomic metric registers for the evaluation path.
#[derive(Debug)]
pub(crate) struct EngineMetrics {
    /// Total evaluations served.
    evaluations: AtomicU64,
    /// Allow verdicts.
    allows: AtomicU64,
    /// Deny verdicts.
    denies: AtomicU64,
    /// Require-review verdicts.
    reviews: AtomicU64,
    /// Cache hits.
    cache_hits: AtomicU64,
    /// Latency histogram counts per bucket, plus an overflow register.
    latency_buckets: Vec<AtomicU64>,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        let latency_buckets =
            (0 ..= EVAL_LATENCY_BUCKETS_US.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            evaluations: AtomicU64::new(0),
            allows: AtomicU64::new(0),
            denies: AtomicU64::new(0),
            reviews: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            latency_buckets,
        }
    }
}

impl EngineMetrics {
    /// Records one evaluation outcome and its latency.
    pub(crate) fn record(&self, verdict: Verdict, latency_micros: u64, cache_hit: bool) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        match verdict {
            Verdict::Allow => self.allows.fetch_add(1, Ordering::Relaxed),
            Verdict::Deny => self.denies.fetch_add(1, Ordering::Relaxed),
            Verdict::RequireReview => self.reviews.fetch_add(1, Ordering::Relaxed),
        };
        if cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        let index = EVAL_LATENCY_BUCKETS_US
            .iter()
            .position(|bound| latency_micros <= *bound)
            .unwrap_or(EVAL_LATENCY_BUCKETS_US.len());
        if let Some(bucket) = self.latency_buckets.get(index) {
            bucket.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns a point-in-time snapshot.
    pub(crate) fn snapshot(&self, bundle_ordinal: u64) -> EngineMetricsSnapshot {
        EngineMetricsSnapshot {
            evaluations: self.evaluations.load(Ordering::Relaxed),
            allows: self.allows.load(Ordering::Relaxed),
            denies: self.denies.load(Ordering::Relaxed),
            reviews: self.reviews.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            latency_bucket_counts: self
                .latency_buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            active_bundle_ordinal: bundle_ordinal,
        }
    }
}

/// Point-in-time engine metrics snapshot.
///
/// # Invariants
/// - `latency_bucket_counts` has one entry per bucket bound plus overflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineMetricsSnapshot {
    /// Total evaluations served.
    pub evaluations: u64,
    /// Allow verdicts.
    pub allows: u64,
    /// Deny verdicts.
    pub denies: u64,
    /// Require-review verdicts.
    pub reviews: u64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Histogram counts aligned with [`EVAL_LATENCY_BUCKETS_US`].
    pub latency_bucket_counts: Vec<u64>,
    /// Ordinal of the active bundle at snapshot time.
    pub active_bundle_ordinal: u64,
}
