// crates/covenant-bandit/src/window.rs
// ============================================================================
// Module: Sliding-Window UCB
// Description: Non-stationary bandit variant with change detection.
// Purpose: Adapt to drifting reward distributions without losing safety.
// Dependencies: covenant-core, serde
// ============================================================================

//! ## Overview
//! The sliding-window variant keeps a bounded deque of recent rewards per
//! arm and runs a Welch t-test between the older and most-recent portions
//! of the window. A detected change marks the arm, grants it an extra
//! exploration bonus, and shrinks the window so stale rewards wash out
//! faster; stable arms slowly grow their window back toward the maximum.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use covenant_core::ArmId;
use covenant_core::Timestamp;
use serde::Serialize;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Sliding-window UCB configuration.
///
/// # Invariants
/// - `min_window_size <= initial_window_size <= max_window_size`.
#[derive(Debug, Clone)]
pub struct SlidingWindowUcbConfig {
    /// Starting window length.
    pub initial_window_size: usize,
    /// Smallest adaptive window length.
    pub min_window_size: usize,
    /// Largest adaptive window length.
    pub max_window_size: usize,
    /// Enable adaptive window sizing.
    pub adaptive_window: bool,
    /// Confidence parameter `alpha`.
    pub alpha: f64,
    /// Exploration bonus granted to changed arms.
    pub exploration_bonus: f64,
    /// Mean-shift magnitude that counts as a change.
    pub change_threshold: f64,
    /// Samples required before change detection runs.
    pub min_samples_for_detection: usize,
    /// Fraction of the window treated as "recent" for detection.
    pub detection_window_ratio: f64,
}

impl Default for SlidingWindowUcbConfig {
    fn default() -> Self {
        Self {
            initial_window_size: 1_000,
            min_window_size: 100,
            max_window_size: 5_000,
            adaptive_window: true,
            alpha: 1.0,
            exploration_bonus: 0.1,
            change_threshold: 0.05,
            min_samples_for_detection: 50,
            detection_window_ratio: 0.3,
        }
    }
}

// ============================================================================
// SECTION: Per-Arm Windows
// ============================================================================

/// Sliding-window state for one arm.
#[derive(Debug)]
struct ArmWindow {
    /// Bounded recent rewards.
    rewards: VecDeque<f64>,
    /// Current adaptive window length.
    window_size: usize,
    /// Total pulls ever observed.
    total_pulls: u64,
    /// True while the arm is marked as changed.
    change_detected: bool,
    /// Timestamp of the last detected change.
    last_change: Option<Timestamp>,
}

impl ArmWindow {
    /// Creates an empty window of the initial size.
    const fn new(window_size: usize) -> Self {
        Self {
            rewards: VecDeque::new(),
            window_size,
            total_pulls: 0,
            change_detected: false,
            last_change: None,
        }
    }

    /// Mean of the window.
    fn mean(&self) -> f64 {
        if self.rewards.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss, reason = "window lengths are small")]
        {
            self.rewards.iter().sum::<f64>() / self.rewards.len() as f64
        }
    }
}

/// Result of one change-detection pass.
///
/// # Invariants
/// - `magnitude` is the absolute mean shift between window halves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeDetection {
    /// Arm the detection ran for.
    pub arm_id: ArmId,
    /// True when a change was detected.
    pub change_detected: bool,
    /// Absolute mean shift.
    pub magnitude: f64,
    /// Welch t statistic.
    pub t_statistic: f64,
    /// Mean of the older portion.
    pub old_mean: f64,
    /// Mean of the recent portion.
    pub new_mean: f64,
}

// ============================================================================
// SECTION: Sliding-Window Optimizer
// ============================================================================

/// Sliding-window UCB for non-stationary workloads.
///
/// # Invariants
/// - Windows never exceed their adaptive length.
pub struct SlidingWindowUcb {
    /// Variant configuration.
    config: SlidingWindowUcbConfig,
    /// Per-arm windows.
    arms: Mutex<BTreeMap<ArmId, ArmWindow>>,
}

impl SlidingWindowUcb {
    /// Creates an optimizer with the given configuration.
    #[must_use]
    pub fn new(config: SlidingWindowUcbConfig) -> Self {
        Self {
            config,
            arms: Mutex::new(BTreeMap::new()),
        }
    }

    /// Records a reward and runs change detection for the arm.
    ///
    /// Returns the detection result when enough samples were available.
    pub fn record(&self, arm_id: &ArmId, reward: f64) -> Option<ChangeDetection> {
        let mut arms = self.arms.lock().ok()?;
        let window = arms
            .entry(arm_id.clone())
            .or_insert_with(|| ArmWindow::new(self.config.initial_window_size));
        window.rewards.push_back(reward);
        window.total_pulls += 1;
        while window.rewards.len() > window.window_size {
            window.rewards.pop_front();
        }

        if window.rewards.len() < self.config.min_samples_for_detection {
            return None;
        }
        let detection = self.detect_change(arm_id, window);
        if detection.change_detected {
            window.change_detected = true;
            window.last_change = Some(Timestamp::now());
            if self.config.adaptive_window {
                // Shrink so stale rewards wash out faster after a shift.
                window.window_size =
                    (window.window_size / 2).max(self.config.min_window_size);
                while window.rewards.len() > window.window_size {
                    window.rewards.pop_front();
                }
            }
        } else if self.config.adaptive_window {
            // Stability grows the window back toward the maximum.
            window.window_size =
                (window.window_size + window.window_size / 10).min(self.config.max_window_size);
        }
        Some(detection)
    }

    /// Upper confidence bound for an arm, with the change bonus applied.
    #[must_use]
    pub fn ucb(&self, arm_id: &ArmId, total_rounds: u64) -> f64 {
        let Ok(arms) = self.arms.lock() else {
            return 0.0;
        };
        let Some(window) = arms.get(arm_id) else {
            return f64::MAX;
        };
        if window.rewards.is_empty() {
            return f64::MAX;
        }
        #[allow(clippy::cast_precision_loss, reason = "counts are small")]
        let exploration = {
            let n = window.rewards.len() as f64;
            let t = (total_rounds.max(1)) as f64;
            self.config.alpha * (2.0 * t.ln() / n).sqrt()
        };
        let bonus =
            if window.change_detected { self.config.exploration_bonus } else { 0.0 };
        window.mean() + exploration + bonus
    }

    /// Selects the arm with the highest windowed UCB.
    #[must_use]
    pub fn select(&self, candidates: &[ArmId], total_rounds: u64) -> Option<ArmId> {
        candidates
            .iter()
            .max_by(|left, right| {
                self.ucb(left, total_rounds)
                    .partial_cmp(&self.ucb(right, total_rounds))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
    }

    /// Returns the current adaptive window length for an arm.
    #[must_use]
    pub fn window_size(&self, arm_id: &ArmId) -> Option<usize> {
        self.arms.lock().ok()?.get(arm_id).map(|window| window.window_size)
    }

    /// Returns the total pulls ever observed for an arm.
    #[must_use]
    pub fn total_pulls(&self, arm_id: &ArmId) -> u64 {
        self.arms
            .lock()
            .ok()
            .and_then(|arms| arms.get(arm_id).map(|window| window.total_pulls))
            .unwrap_or(0)
    }

    /// Returns the timestamp of the last detected change for an arm.
    #[must_use]
    pub fn last_change(&self, arm_id: &ArmId) -> Option<Timestamp> {
        self.arms.lock().ok()?.get(arm_id).and_then(|window| window.last_change)
    }

    /// Clears the change mark after the caller has reacted to it.
    pub fn acknowledge_change(&self, arm_id: &ArmId) {
        if let Ok(mut arms) = self.arms.lock()
            && let Some(window) = arms.get_mut(arm_id)
        {
            window.change_detected = false;
        }
    }

    /// Welch t-test between the older and most-recent window portions.
    fn detect_change(&self, arm_id: &ArmId, window: &ArmWindow) -> ChangeDetection {
        let len = window.rewards.len();
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss,
            reason = "window lengths are small and ratios are clamped"
        )]
        let recent_len = ((len as f64) * self.config.detection_window_ratio.clamp(0.1, 0.9))
            .round() as usize;
        let recent_len = recent_len.clamp(2, len.saturating_sub(2));
        let split = len - recent_len;

        let older: Vec<f64> = window.rewards.iter().copied().take(split).collect();
        let recent: Vec<f64> = window.rewards.iter().copied().skip(split).collect();
        let (old_mean, old_var) = mean_and_variance(&older);
        let (new_mean, new_var) = mean_and_variance(&recent);

        #[allow(clippy::cast_precision_loss, reason = "window lengths are small")]
        let standard_error =
            (old_var / older.len() as f64 + new_var / recent.len() as f64).sqrt();
        let magnitude = (new_mean - old_mean).abs();
        let t_statistic = if standard_error > 0.0 {
            (new_mean - old_mean) / standard_error
        } else if magnitude > 0.0 {
            // Zero variance on both sides of a real shift: maximally
            // significant.
            f64::INFINITY * (new_mean - old_mean).signum()
        } else {
            0.0
        };
        let change_detected =
            magnitude > self.config.change_threshold && t_statistic.abs() > 2.0;

        ChangeDetection {
            arm_id: arm_id.clone(),
            change_detected,
            magnitude,
            t_statistic,
            old_mean,
            new_mean,
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Sample mean and (Bessel-corrected) variance.
fn mean_and_variance(samples: &[f64]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    #[allow(clippy::cast_precision_loss, reason = "window lengths are small")]
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    if samples.len() < 2 {
        return (mean, 0.0);
    }
    let variance =
        samples.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
