// crates/covenant-verify/src/pipeline.rs
// ============================================================================
// Module: Verification Pipeline
// Description: Obligation fan-out, tier execution, caching, and merging.
// Purpose: Run tiered verification on a bounded worker pool with timeouts.
// Dependencies: crate::{properties, solver}, covenant-cache, covenant-core, tokio
// ============================================================================

//! ## Overview
//! The pipeline expands a verification request into (rule, property, tier)
//! obligations, fans them out over a bounded worker pool, and merges the
//! terminal statuses deterministically. The request tier is a capability
//! ceiling: it scopes which catalog properties are instantiated, so cheap
//! tiers stay cheap and rigorous requests get the full catalog. Each
//! obligation consults the decision cache first; only stable outcomes
//! (proved / disproved) are written back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use covenant_cache::CacheKind;
use covenant_cache::DecisionCache;
use covenant_core::ConstitutionalTag;
use covenant_core::DEFAULT_HASH_ALGORITHM;
use covenant_core::Obligation;
use covenant_core::ObligationStatus;
use covenant_core::ProofObject;
use covenant_core::PropertySpec;
use covenant_core::RuleId;
use covenant_core::Timestamp;
use covenant_core::VerificationReport;
use covenant_core::VerificationTier;
use covenant_core::hash_bytes;
use covenant_core::hash_canonical_json;
use covenant_core::interfaces::RuleSourceFile;
use covenant_core::interfaces::VerificationError;
use covenant_core::interfaces::Verifier;
use covenant_rules::Rule;
use covenant_rules::Verdict;
use covenant_rules::parse_rule;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::properties::PropertyCheck;
use crate::properties::resolve_check;
use crate::solver::Atom;
use crate::solver::Conjunction;
use crate::solver::SolveOutcome;
use crate::solver::solve;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Verification pipeline configuration.
///
/// # Invariants
/// - `worker_count >= 1`; the semaphore bounds concurrent obligations.
#[derive(Debug, Clone)]
pub struct VerificationPipelineConfig {
    /// Constitutional tag stamped on reports and proofs.
    pub tag: ConstitutionalTag,
    /// Worker pool size.
    pub worker_count: usize,
    /// Per-obligation timeout.
    pub obligation_timeout: Duration,
    /// Permit downgrading an undecided rigorous obligation to semantic.
    pub allow_tier_fallback: bool,
}

impl Default for VerificationPipelineConfig {
    fn default() -> Self {
        Self {
            tag: ConstitutionalTag::deployment_default(),
            worker_count: 8,
            obligation_timeout: Duration::from_secs(5),
            allow_tier_fallback: false,
        }
    }
}

// ============================================================================
// SECTION: Cached Obligation Results
// ============================================================================

/// Cacheable obligation outcome (stable statuses only).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedObligation {
    /// Terminal status (`proved` or `disproved`).
    status: ObligationStatus,
    /// Evidence note.
    evidence: Option<String>,
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Tiered verification pipeline.
///
/// # Invariants
/// - Obligations are independent; merge order never affects the aggregate.
pub struct VerificationPipeline {
    /// Pipeline configuration.
    config: VerificationPipelineConfig,
    /// Optional obligation-result cache.
    cache: Option<Arc<DecisionCache>>,
    /// Worker pool permits.
    permits: Arc<Semaphore>,
}

impl VerificationPipeline {
    /// Creates a pipeline with a worker pool of the configured size.
    #[must_use]
    pub fn new(config: VerificationPipelineConfig, cache: Option<Arc<DecisionCache>>) -> Self {
        let permits = Arc::new(Semaphore::new(config.worker_count.max(1)));
        Self {
            config,
            cache,
            permits,
        }
    }

    /// Verifies sources against properties at the requested tier.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::Worker`] for pool infrastructure
    /// failures only; undecided obligations surface inside the report.
    pub async fn run(
        &self,
        sources: &[RuleSourceFile],
        properties: &[PropertySpec],
        tier: VerificationTier,
    ) -> Result<VerificationReport, VerificationError> {
        let started = Instant::now();
        let mut cache_hits: u64 = 0;
        let mut obligations: Vec<Obligation> = Vec::new();
        let mut join_set: JoinSet<(usize, Obligation)> = JoinSet::new();
        let mut pending_index = 0usize;

        for source in sources {
            let rule_id = RuleId::new(source.name.clone());
            let rule_digest = hash_bytes(DEFAULT_HASH_ALGORITHM, source.content.as_bytes());

            // Structural obligation: every tier includes the automated pass.
            let parsed = match parse_rule(&source.content) {
                Ok(rule) => {
                    obligations.push(Obligation {
                        rule_id: rule_id.clone(),
                        property_id: covenant_core::PropertyId::new("structure"),
                        tier: VerificationTier::Automated,
                        status: ObligationStatus::Proved,
                        elapsed_millis: Some(0),
                        evidence: None,
                    });
                    Some(Arc::new(rule))
                }
                Err(err) => {
                    obligations.push(Obligation {
                        rule_id: rule_id.clone(),
                        property_id: covenant_core::PropertyId::new("structure"),
                        tier: VerificationTier::Automated,
                        status: ObligationStatus::Disproved,
                        elapsed_millis: Some(0),
                        evidence: Some(err.to_string()),
                    });
                    None
                }
            };
            let Some(rule) = parsed else {
                continue;
            };

            for property in properties {
                let check = resolve_check(property);
                let minimum = check
                    .as_ref()
                    .map_or(VerificationTier::Rigorous, PropertyCheck::minimum_tier);
                // The request tier is a capability ceiling: properties above
                // it are not instantiated at this tier.
                if minimum > tier {
                    continue;
                }

                let obligation = Obligation {
                    rule_id: rule_id.clone(),
                    property_id: property.property_id.clone(),
                    tier,
                    status: ObligationStatus::Pending,
                    elapsed_millis: None,
                    evidence: None,
                };

                let cache_key = obligation_cache_key(&rule_digest.value, property, tier);
                if let Some(cached) = self.cached_outcome(&cache_key).await {
                    cache_hits += 1;
                    obligations.push(Obligation {
                        status: cached.status,
                        elapsed_millis: Some(0),
                        evidence: cached.evidence,
                        ..obligation
                    });
                    continue;
                }

                let slot = pending_index;
                pending_index += 1;
                obligations.push(Obligation {
                    status: ObligationStatus::Running,
                    ..obligation.clone()
                });
                let rule = Arc::clone(&rule);
                let permits = Arc::clone(&self.permits);
                let timeout = self.config.obligation_timeout;
                let allow_fallback = self.config.allow_tier_fallback;
                join_set.spawn(async move {
                    let _permit = permits.acquire_owned().await;
                    let run_started = Instant::now();
                    let outcome = tokio::time::timeout(timeout, async {
                        tokio::task::yield_now().await;
                        decide_obligation(&rule, check.as_ref(), tier, allow_fallback)
                    })
                    .await;
                    let (status, evidence) = match outcome {
                        Ok((status, evidence)) => (status, evidence),
                        Err(_) => {
                            (ObligationStatus::Timeout, Some("obligation timed out".to_string()))
                        }
                    };
                    let elapsed =
                        u64::try_from(run_started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    (slot, Obligation {
                        status,
                        elapsed_millis: Some(elapsed),
                        evidence,
                        ..obligation
                    })
                });
            }
        }

        // Harvest worker results and overwrite the running placeholders.
        let mut finished: Vec<(usize, Obligation)> = Vec::with_capacity(pending_index);
        while let Some(joined) = join_set.join_next().await {
            let (slot, obligation) =
                joined.map_err(|err| VerificationError::Worker(err.to_string()))?;
            finished.push((slot, obligation));
        }
        let mut running = obligations
            .iter_mut()
            .filter(|obligation| obligation.status == ObligationStatus::Running)
            .collect::<Vec<_>>();
        finished.sort_by_key(|(slot, _)| *slot);
        for ((_, done), placeholder) in finished.into_iter().zip(running.iter_mut()) {
            **placeholder = done;
        }
        drop(running);

        // Write stable outcomes back to the cache.
        for obligation in &obligations {
            if matches!(
                obligation.status,
                ObligationStatus::Proved | ObligationStatus::Disproved
            ) && obligation.tier == tier
            {
                self.store_outcome(sources, obligation, tier).await;
            }
        }

        // Deterministic merge order regardless of completion order.
        obligations.sort_by(|left, right| {
            (left.rule_id.as_str(), left.property_id.as_str())
                .cmp(&(right.rule_id.as_str(), right.property_id.as_str()))
        });
        let aggregate = VerificationReport::merge_statuses(&obligations);
        Ok(VerificationReport {
            tier,
            obligations,
            aggregate,
            total_millis: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            cache_hits,
            tag: self.config.tag.clone(),
        })
    }

    /// Generates a proof object for one property over one rule source.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::Worker`] when the input fails to hash.
    pub fn generate_proof(
        &self,
        source: &RuleSourceFile,
        property: &PropertySpec,
    ) -> Result<ProofObject, VerificationError> {
        let input_digest = hash_canonical_json(
            DEFAULT_HASH_ALGORITHM,
            &json!({
                "rule": source.content,
                "property": property.property_id.as_str(),
            }),
        )
        .map_err(|err| VerificationError::Worker(err.to_string()))?;

        let mut steps = Vec::new();
        let mut counter_example = None;
        match parse_rule(&source.content) {
            Ok(rule) => match resolve_check(property) {
                Some(check) => {
                    let (status, evidence) =
                        decide_obligation(&rule, Some(&check), VerificationTier::Rigorous, false);
                    steps.push(format!(
                        "decided {} at rigorous tier: {}",
                        property.property_id,
                        status.as_str()
                    ));
                    if let Some(evidence) = evidence {
                        if status == ObligationStatus::Disproved {
                            counter_example =
                                serde_json::from_str(&evidence).ok().or(Some(json!(evidence)));
                        } else {
                            steps.push(evidence);
                        }
                    }
                    if status == ObligationStatus::Proved {
                        steps.push("negation unsatisfiable over all allow clauses".to_string());
                    }
                }
                None => {
                    steps.push(format!("unknown property {}", property.property_id));
                }
            },
            Err(err) => {
                steps.push(format!("rule failed structural checks: {err}"));
            }
        }

        Ok(ProofObject {
            property_id: property.property_id.clone(),
            steps,
            counter_example,
            input_digest,
            tag: self.config.tag.clone(),
            generated_at: Timestamp::now(),
        })
    }

    /// Fetches a cached stable outcome.
    async fn cached_outcome(&self, key: &str) -> Option<CachedObligation> {
        let cache = self.cache.as_ref()?;
        let entry = cache.get(key).await?;
        serde_json::from_value(entry.value).ok()
    }

    /// Writes one stable outcome back to the cache.
    async fn store_outcome(
        &self,
        sources: &[RuleSourceFile],
        obligation: &Obligation,
        tier: VerificationTier,
    ) {
        let Some(cache) = &self.cache else {
            return;
        };
        let Some(source) =
            sources.iter().find(|source| source.name == obligation.rule_id.as_str())
        else {
            return;
        };
        let rule_digest = hash_bytes(DEFAULT_HASH_ALGORITHM, source.content.as_bytes());
        let property = PropertySpec {
            property_id: obligation.property_id.clone(),
            description: String::new(),
            requires_numeric_witness: false,
        };
        let key = obligation_cache_key(&rule_digest.value, &property, tier);
        let cached = CachedObligation {
            status: obligation.status,
            evidence: obligation.evidence.clone(),
        };
        if let Ok(value) = serde_json::to_value(&cached)
            && let Err(err) = cache.set(&key, value, CacheKind::Verification, None).await
        {
            debug!(error = %err, "failed to cache obligation outcome");
        }
    }
}

/// Builds the cache key for an obligation outcome.
fn obligation_cache_key(rule_digest: &str, property: &PropertySpec, tier: VerificationTier)
-> String {
    format!("verify:{rule_digest}:{}:{}", property.property_id, tier.as_str())
}

// ============================================================================
// SECTION: Obligation Decision Procedures
// ============================================================================

/// Decides one obligation for a parsed rule.
///
/// Returns the terminal status and optional evidence. Checks the catalog
/// does not know yield `unknown`.
fn decide_obligation(
    rule: &Rule,
    check: Option<&PropertyCheck>,
    tier: VerificationTier,
    allow_fallback: bool,
) -> (ObligationStatus, Option<String>) {
    let Some(check) = check else {
        return (ObligationStatus::Unknown, Some("property not in catalog".to_string()));
    };
    let outcome = match check {
        PropertyCheck::NoConflictingClauses => check_no_conflicts(rule),
        PropertyCheck::NoDeadClauses => check_no_dead_clauses(rule),
        PropertyCheck::NoForbiddenAllow {
            forbidden,
        } => check_no_forbidden_allow(rule, forbidden),
    };
    // Fail-open tier downgrade: an undecided rigorous obligation may retry
    // the semantic checks when the caller explicitly permits it.
    if allow_fallback
        && tier == VerificationTier::Rigorous
        && outcome.0 == ObligationStatus::Unknown
        && matches!(check, PropertyCheck::NoForbiddenAllow { .. })
    {
        let (status, evidence) = check_no_conflicts(rule);
        if status == ObligationStatus::Proved {
            return (
                ObligationStatus::Unknown,
                Some("rigorous undecided; semantic fallback found no conflicts".to_string()),
            );
        }
        return (status, evidence);
    }
    outcome
}

/// Proves that equally specific clauses with different verdicts never fire
/// together.
fn check_no_conflicts(rule: &Rule) -> (ObligationStatus, Option<String>) {
    for (left_index, left) in rule.clauses.iter().enumerate() {
        for (right_index, right) in rule.clauses.iter().enumerate().skip(left_index + 1) {
            if left.verdict == right.verdict || left.specificity() != right.specificity() {
                continue;
            }
            let Some(left_conj) = Conjunction::from_conditions(&left.conditions) else {
                return (ObligationStatus::Unknown, Some(outside_abstraction(left_index)));
            };
            let Some(right_conj) = Conjunction::from_conditions(&right.conditions) else {
                return (ObligationStatus::Unknown, Some(outside_abstraction(right_index)));
            };
            match solve(&left_conj.and(&right_conj.atoms)) {
                SolveOutcome::Sat {
                    model,
                } => {
                    let rendered = serde_json::to_string(&model).unwrap_or_default();
                    return (
                        ObligationStatus::Disproved,
                        Some(format!(
                            "clauses {left_index} and {right_index} conflict on {rendered}"
                        )),
                    );
                }
                SolveOutcome::Unsat => {}
                SolveOutcome::Unknown {
                    reason,
                } => return (ObligationStatus::Unknown, Some(reason)),
            }
        }
    }
    (ObligationStatus::Proved, None)
}

/// Proves that every clause guard is satisfiable.
fn check_no_dead_clauses(rule: &Rule) -> (ObligationStatus, Option<String>) {
    for (index, clause) in rule.clauses.iter().enumerate() {
        let Some(conjunction) = Conjunction::from_conditions(&clause.conditions) else {
            return (ObligationStatus::Unknown, Some(outside_abstraction(index)));
        };
        match solve(&conjunction) {
            SolveOutcome::Sat {
                ..
            } => {}
            SolveOutcome::Unsat => {
                return (
                    ObligationStatus::Disproved,
                    Some(format!("clause {index} guard is unsatisfiable")),
                );
            }
            SolveOutcome::Unknown {
                reason,
            } => return (ObligationStatus::Unknown, Some(reason)),
        }
    }
    (ObligationStatus::Proved, None)
}

/// Proves that no allow clause is satisfiable inside the forbidden region.
///
/// Proved iff the conjunction (clause guard ∧ forbidden atoms) — the
/// negation of the property — is unsatisfiable for every allow clause.
fn check_no_forbidden_allow(rule: &Rule, forbidden: &[Atom]) -> (ObligationStatus, Option<String>) {
    for (index, clause) in rule.clauses.iter().enumerate() {
        if clause.verdict != Verdict::Allow {
            continue;
        }
        let Some(conjunction) = Conjunction::from_conditions(&clause.conditions) else {
            return (ObligationStatus::Unknown, Some(outside_abstraction(index)));
        };
        match solve(&conjunction.and(forbidden)) {
            SolveOutcome::Sat {
                model,
            } => {
                let rendered = serde_json::to_string(&model).unwrap_or_default();
                return (ObligationStatus::Disproved, Some(rendered));
            }
            SolveOutcome::Unsat => {}
            SolveOutcome::Unknown {
                reason,
            } => return (ObligationStatus::Unknown, Some(reason)),
        }
    }
    (ObligationStatus::Proved, None)
}

/// Evidence note for conditions outside the solver abstraction.
fn outside_abstraction(clause_index: usize) -> String {
    format!("clause {clause_index} uses conditions outside the solver abstraction")
}

// ============================================================================
// SECTION: Interface Implementation
// ============================================================================

#[async_trait]
impl Verifier for VerificationPipeline {
    async fn verify(
        &self,
        sources: &[RuleSourceFile],
        properties: &[PropertySpec],
        tier: VerificationTier,
    ) -> Result<VerificationReport, VerificationError> {
        self.run(sources, properties, tier).await
    }
}
