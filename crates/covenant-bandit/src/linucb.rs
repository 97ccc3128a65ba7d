// crates/covenant-bandit/src/linucb.rs
// ============================================================================
// Module: Conservative Constrained LinUCB
// Description: Safety-filtered contextual bandit over per-arm design matrices.
// Purpose: Optimize arm selection without ever dropping below the baseline.
// Dependencies: crate::{context, linalg}, covenant-core, ndarray
// ============================================================================

//! ## Overview
//! Each arm keeps a ridge-regularized design matrix `A = λI + Σ x·xᵀ` and
//! reward vector `b = Σ r·x`; the parameter estimate is the solve
//! `θ = A⁻¹·b`. Selection filters arms through the conservative constraint
//! (lower confidence bound within the safety threshold of the baseline),
//! then maximizes the upper confidence bound plus a constitutional
//! exploration bonus. When no arm is safe, the optimizer either falls back
//! to the arm closest to the baseline (recording a safety violation) or
//! refuses outright. The baseline is the 25th percentile of a bounded
//! reward window, refreshed every `update_frequency` rounds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use covenant_core::ArmId;
use covenant_core::AuditActor;
use covenant_core::AuditEventDraft;
use covenant_core::AuditEventKind;
use covenant_core::ConstitutionalTag;
use covenant_core::Timestamp;
use covenant_core::interfaces::ArmSelection;
use covenant_core::interfaces::AuditSink;
use covenant_core::interfaces::BanditError;
use covenant_core::interfaces::DecisionOptimizer;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::warn;

use crate::context::extract_context;
use crate::linalg::quadratic_form;
use crate::linalg::solve_linear_system;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Conservative LinUCB configuration.
///
/// # Invariants
/// - `min_baseline_samples <= baseline_window`; `context_dimension >= 1`.
#[derive(Debug, Clone)]
pub struct ConservativeLinUcbConfig {
    /// Constitutional tag required on reward updates.
    pub tag: ConstitutionalTag,
    /// Confidence parameter `alpha`.
    pub alpha: f64,
    /// Ridge regularization `lambda`.
    pub lambda_reg: f64,
    /// Maximum allowed drop below the baseline.
    pub safety_threshold: f64,
    /// Reward window length for the baseline percentile.
    pub baseline_window: usize,
    /// Pulls before the safety filter applies to an arm.
    pub min_baseline_samples: usize,
    /// Rounds between baseline refreshes.
    pub update_frequency: u64,
    /// Context vector dimension.
    pub context_dimension: usize,
    /// Exploration bonus scale applied to mean constitutional scores.
    pub exploration_bonus: f64,
    /// Fall back to the closest-to-baseline arm when none is safe.
    pub fallback_to_baseline: bool,
}

impl Default for ConservativeLinUcbConfig {
    fn default() -> Self {
        Self {
            tag: ConstitutionalTag::deployment_default(),
            alpha: 1.0,
            lambda_reg: 1.0,
            safety_threshold: 0.1,
            baseline_window: 100,
            min_baseline_samples: 10,
            update_frequency: 50,
            context_dimension: 10,
            exploration_bonus: 0.1,
            fallback_to_baseline: true,
        }
    }
}

// ============================================================================
// SECTION: Arm State
// ============================================================================

/// Mutable statistics for one arm.
#[derive(Debug, Clone)]
struct ArmState {
    /// Design matrix `A`.
    design: Array2<f64>,
    /// Reward vector `b`.
    rewards: Array1<f64>,
    /// Pull count.
    pulls: u64,
    /// Total accumulated reward.
    total_reward: f64,
    /// Rolling constitutional scores.
    constitutional_scores: VecDeque<f64>,
    /// Rolling safety scores.
    safety_scores: VecDeque<f64>,
    /// Creation timestamp.
    created_at: Timestamp,
}

impl ArmState {
    /// Initializes an arm with `A = λI` and zeroed rewards.
    fn new(dimension: usize, lambda_reg: f64, created_at: Timestamp) -> Self {
        Self {
            design: Array2::eye(dimension) * lambda_reg,
            rewards: Array1::zeros(dimension),
            pulls: 0,
            total_reward: 0.0,
            constitutional_scores: VecDeque::new(),
            safety_scores: VecDeque::new(),
            created_at,
        }
    }

    /// Estimated reward `θᵀ·x`, falling back to the pull average.
    fn estimate(&self, x: &Array1<f64>) -> f64 {
        if self.pulls == 0 {
            return 0.0;
        }
        solve_linear_system(&self.design, &self.rewards).map_or_else(
            || {
                #[allow(clippy::cast_precision_loss, reason = "pull counts are small")]
                {
                    self.total_reward / self.pulls as f64
                }
            },
            |theta| theta.dot(x),
        )
    }

    /// Confidence bound `α·√(xᵀ·A⁻¹·x)`, falling back to `α`.
    fn confidence(&self, x: &Array1<f64>, alpha: f64) -> f64 {
        quadratic_form(&self.design, x).map_or(alpha, |form| alpha * form.max(0.0).sqrt())
    }

    /// Mean of the rolling constitutional scores.
    fn mean_constitutional(&self) -> f64 {
        if self.constitutional_scores.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss, reason = "window lengths are small")]
        {
            self.constitutional_scores.iter().sum::<f64>()
                / self.constitutional_scores.len() as f64
        }
    }
}

/// Read-only statistics snapshot for one arm.
///
/// # Invariants
/// - Values reflect one consistent observation of the arm state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArmSnapshot {
    /// Arm identifier.
    pub arm_id: ArmId,
    /// Pull count.
    pub pulls: u64,
    /// Total accumulated reward.
    pub total_reward: f64,
    /// Average reward per pull.
    pub average_reward: f64,
    /// Mean rolling constitutional score.
    pub mean_constitutional: f64,
    /// Mean rolling safety score.
    pub mean_safety: f64,
    /// Euclidean norm of the parameter estimate.
    pub theta_norm: f64,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Selection Outcomes
// ============================================================================

/// Outcome of one arm selection.
///
/// # Invariants
/// - `fallback` is true only when the safety filter rejected every arm.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionOutcome {
    /// Selected arm.
    pub arm_id: ArmId,
    /// True when the selection was a baseline fallback.
    pub fallback: bool,
    /// Arms that passed the safety filter.
    pub eligible: usize,
}

// ============================================================================
// SECTION: Baseline State
// ============================================================================

/// Baseline bookkeeping over a bounded reward window.
#[derive(Debug, Default)]
struct BaselineState {
    /// Bounded recent-reward window.
    history: VecDeque<f64>,
    /// Published baseline (25th percentile), refreshed periodically.
    baseline: Option<f64>,
}

// ============================================================================
// SECTION: Optimizer
// ============================================================================

/// Conservative constrained LinUCB optimizer.
///
/// # Invariants
/// - Arm updates are serialized; selection observes a consistent snapshot.
/// - Reward updates without the configured tag are rejected.
pub struct ConservativeLinUcb {
    /// Optimizer configuration.
    config: ConservativeLinUcbConfig,
    /// Arm states keyed by identifier.
    arms: Mutex<BTreeMap<ArmId, ArmState>>,
    /// Baseline window and published value.
    baseline: Mutex<BaselineState>,
    /// Total reward updates processed.
    total_rounds: AtomicU64,
    /// Safety-filter fallbacks taken.
    safety_violations: AtomicU64,
    /// Optional audit sink for safety violations.
    audit: Option<Arc<dyn AuditSink>>,
}

impl ConservativeLinUcb {
    /// Creates an optimizer with the given configuration.
    #[must_use]
    pub fn new(config: ConservativeLinUcbConfig, audit: Option<Arc<dyn AuditSink>>) -> Self {
        Self {
            config,
            arms: Mutex::new(BTreeMap::new()),
            baseline: Mutex::new(BaselineState::default()),
            total_rounds: AtomicU64::new(0),
            safety_violations: AtomicU64::new(0),
            audit,
        }
    }

    /// Seeds the published baseline directly (tests and warm starts).
    pub fn seed_baseline(&self, baseline: f64) {
        if let Ok(mut state) = self.baseline.lock() {
            state.baseline = Some(baseline);
        }
    }

    /// Returns the published baseline, if established.
    #[must_use]
    pub fn baseline(&self) -> Option<f64> {
        self.baseline.lock().ok().and_then(|state| state.baseline)
    }

    /// Returns the number of safety-filter fallbacks taken.
    #[must_use]
    pub fn safety_violations(&self) -> u64 {
        self.safety_violations.load(Ordering::Relaxed)
    }

    /// Returns a statistics snapshot for one arm.
    #[must_use]
    pub fn arm_snapshot(&self, arm_id: &ArmId) -> Option<ArmSnapshot> {
        let arms = self.arms.lock().ok()?;
        let state = arms.get(arm_id)?;
        #[allow(clippy::cast_precision_loss, reason = "pull counts are small")]
        let average_reward =
            if state.pulls == 0 { 0.0 } else { state.total_reward / state.pulls as f64 };
        let theta_norm = solve_linear_system(&state.design, &state.rewards)
            .map_or(0.0, |theta| theta.dot(&theta).sqrt());
        #[allow(clippy::cast_precision_loss, reason = "window lengths are small")]
        let mean_safety = if state.safety_scores.is_empty() {
            0.0
        } else {
            state.safety_scores.iter().sum::<f64>() / state.safety_scores.len() as f64
        };
        Some(ArmSnapshot {
            arm_id: arm_id.clone(),
            pulls: state.pulls,
            total_reward: state.total_reward,
            average_reward,
            mean_constitutional: state.mean_constitutional(),
            mean_safety,
            theta_norm,
            created_at: state.created_at,
        })
    }

    /// Selects an arm under the conservative constraint.
    ///
    /// # Errors
    ///
    /// Returns [`BanditError::NoSafeArm`] when every arm fails the filter
    /// and fallback is disabled, or when no arms were offered.
    pub fn select_arm(
        &self,
        context: &Map<String, Value>,
        candidates: &[ArmId],
    ) -> Result<SelectionOutcome, BanditError> {
        if candidates.is_empty() {
            return Err(BanditError::NoSafeArm);
        }
        let x = extract_context(context, self.config.context_dimension, Timestamp::now());
        let baseline = self.baseline();

        let mut arms = self.arms.lock().map_err(|_| BanditError::NoSafeArm)?;
        for arm_id in candidates {
            arms.entry(arm_id.clone()).or_insert_with(|| {
                ArmState::new(
                    self.config.context_dimension,
                    self.config.lambda_reg,
                    Timestamp::now(),
                )
            });
        }

        // Safety filter: new arms pass for exploration; established arms
        // need their lower confidence bound above the safety floor.
        let mut eligible: Vec<&ArmId> = Vec::new();
        for arm_id in candidates {
            let Some(state) = arms.get(arm_id) else {
                continue;
            };
            let safe = state.pulls < self.config.min_baseline_samples as u64
                || baseline.is_none_or(|floor| {
                    let estimate = state.estimate(&x);
                    let confidence = state.confidence(&x, self.config.alpha);
                    estimate - confidence >= floor - self.config.safety_threshold
                });
            if safe {
                eligible.push(arm_id);
            }
        }

        if eligible.is_empty() {
            if self.config.fallback_to_baseline
                && let Some(floor) = baseline
            {
                // Fall back to the arm whose estimate sits closest to the
                // baseline, recording the violation.
                let fallback = candidates
                    .iter()
                    .min_by(|left, right| {
                        let left_distance = arms
                            .get(*left)
                            .map_or(f64::INFINITY, |state| (state.estimate(&x) - floor).abs());
                        let right_distance = arms
                            .get(*right)
                            .map_or(f64::INFINITY, |state| (state.estimate(&x) - floor).abs());
                        left_distance
                            .partial_cmp(&right_distance)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .cloned();
                drop(arms);
                if let Some(arm_id) = fallback {
                    self.safety_violations.fetch_add(1, Ordering::Relaxed);
                    return Ok(SelectionOutcome {
                        arm_id,
                        fallback: true,
                        eligible: 0,
                    });
                }
            }
            return Err(BanditError::NoSafeArm);
        }

        // Among safe arms: argmax of UCB plus the constitutional bonus.
        let selected = eligible
            .iter()
            .max_by(|left, right| {
                let left_score = arms.get(**left).map_or(f64::MIN, |state| {
                    state.estimate(&x)
                        + state.confidence(&x, self.config.alpha)
                        + self.config.exploration_bonus * state.mean_constitutional()
                });
                let right_score = arms.get(**right).map_or(f64::MIN, |state| {
                    state.estimate(&x)
                        + state.confidence(&x, self.config.alpha)
                        + self.config.exploration_bonus * state.mean_constitutional()
                });
                left_score.partial_cmp(&right_score).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|arm_id| (*arm_id).clone());
        let eligible_count = eligible.len();
        drop(arms);

        selected.map_or(Err(BanditError::NoSafeArm), |arm_id| {
            debug!(arm = %arm_id, eligible = eligible_count, "selected arm");
            Ok(SelectionOutcome {
                arm_id,
                fallback: false,
                eligible: eligible_count,
            })
        })
    }

    /// Records a reward observation for an arm.
    ///
    /// # Errors
    ///
    /// Returns [`BanditError::ConstitutionalMismatch`] when the update tag
    /// differs from the configured tag; the update is rejected.
    pub fn update_reward(
        &self,
        arm_id: &ArmId,
        reward: f64,
        context: &Map<String, Value>,
        tag: &ConstitutionalTag,
    ) -> Result<(), BanditError> {
        if *tag != self.config.tag {
            return Err(BanditError::ConstitutionalMismatch(tag.to_string()));
        }
        let x = extract_context(context, self.config.context_dimension, Timestamp::now());

        {
            let mut arms =
                self.arms.lock().map_err(|_| BanditError::UnknownArm(arm_id.to_string()))?;
            let state = arms.entry(arm_id.clone()).or_insert_with(|| {
                ArmState::new(
                    self.config.context_dimension,
                    self.config.lambda_reg,
                    Timestamp::now(),
                )
            });

            // A ← A + x·xᵀ, b ← b + r·x.
            let column = x.clone().insert_axis(Axis(1));
            let row = x.clone().insert_axis(Axis(0));
            state.design = &state.design + &column.dot(&row);
            state.rewards = &state.rewards + &(&x * reward);
            state.pulls += 1;
            state.total_reward += reward;

            let constitutional = context
                .get("constitutional_compliance")
                .and_then(Value::as_f64)
                .unwrap_or(0.5);
            let safety = context.get("safety_score").and_then(Value::as_f64).unwrap_or(0.5);
            push_bounded(&mut state.constitutional_scores, constitutional, self.config.baseline_window);
            push_bounded(&mut state.safety_scores, safety, self.config.baseline_window);
        }

        let round = self.total_rounds.fetch_add(1, Ordering::SeqCst) + 1;
        self.update_baseline(reward, round);
        Ok(())
    }

    /// Updates the baseline window and periodically republishes the floor.
    fn update_baseline(&self, reward: f64, round: u64) {
        let Ok(mut state) = self.baseline.lock() else {
            return;
        };
        push_bounded(&mut state.history, reward, self.config.baseline_window);
        if state.history.len() < self.config.min_baseline_samples {
            return;
        }
        // The floor is republished on the configured cadence, and computed
        // only from the same window it is published for.
        let due = state.baseline.is_none() || round % self.config.update_frequency == 0;
        if due {
            let samples: Vec<f64> = state.history.iter().copied().collect();
            state.baseline = Some(percentile(&samples, 0.25));
        }
    }

    /// Emits a safety-violation audit event for a fallback selection.
    async fn audit_safety_violation(&self, arm_id: &ArmId) {
        let Some(audit) = &self.audit else {
            return;
        };
        let draft = AuditEventDraft {
            actor: AuditActor::Bandit,
            kind: AuditEventKind::SafetyViolation,
            payload: json!({
                "fallback_arm": arm_id.as_str(),
                "baseline": self.baseline(),
            }),
            timestamp: Timestamp::now(),
            tag: self.config.tag.clone(),
        };
        if let Err(err) = audit.append(draft).await {
            warn!(error = %err, "failed to audit bandit safety violation");
        }
    }
}

// ============================================================================
// SECTION: Interface Implementation
// ============================================================================

#[async_trait]
impl DecisionOptimizer for ConservativeLinUcb {
    async fn select(
        &self,
        context: &Map<String, Value>,
        arms: &[ArmId],
    ) -> Result<ArmSelection, BanditError> {
        let outcome = self.select_arm(context, arms)?;
        if outcome.fallback {
            self.audit_safety_violation(&outcome.arm_id).await;
        }
        Ok(ArmSelection {
            arm_id: outcome.arm_id,
            fallback: outcome.fallback,
        })
    }

    async fn observe(
        &self,
        arm_id: &ArmId,
        reward: f64,
        context: &Map<String, Value>,
        tag: &ConstitutionalTag,
    ) -> Result<(), BanditError> {
        self.update_reward(arm_id, reward, context, tag)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Pushes into a bounded deque, evicting the oldest entry on overflow.
fn push_bounded(window: &mut VecDeque<f64>, value: f64, capacity: usize) {
    window.push_back(value);
    while window.len() > capacity.max(1) {
        window.pop_front();
    }
}

/// Linear-interpolated percentile over unsorted samples.
///
/// Matches the conventional `numpy`-style linear interpolation between the
/// two nearest order statistics.
#[must_use]
pub(crate) fn percentile(samples: &[f64], quantile: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|left, right| left.partial_cmp(right).unwrap_or(std::cmp::Ordering::Equal));
    #[allow(clippy::cast_precision_loss, reason = "window lengths are small")]
    let rank = quantile.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor();
    let upper = rank.ceil();
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "ranks are clamped into the sample range"
    )]
    let (lower_index, upper_index) = (lower as usize, upper as usize);
    let lower_value = sorted.get(lower_index).copied().unwrap_or(0.0);
    let upper_value = sorted.get(upper_index).copied().unwrap_or(lower_value);
    (rank - lower).mul_add(upper_value - lower_value, lower_value)
}
