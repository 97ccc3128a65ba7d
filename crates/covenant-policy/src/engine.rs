// crates/covenant-policy/src/engine.rs
// ============================================================================
// Module: Policy Evaluation Engine
// Description: Active-bundle evaluation with caching, metrics, and swaps.
// Purpose: Serve verdicts in a single pass with RCU bundle reads.
// Dependencies: crate::{bundle, compile, telemetry}, covenant-cache, covenant-core
// ============================================================================

//! ## Overview
//! The engine holds the single active bundle behind a read-copy-update
//! pointer: evaluators clone an `Arc` snapshot and never block activation.
//! Evaluation fingerprints the request, consults the decision cache, and on
//! miss runs a single pass over the active rules, reporting the winning
//! rule in the justification trace. Activation and rollback are atomic
//! pointer swaps with audit events; the retired bundle stays addressable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Instant;

use async_trait::async_trait;
use covenant_cache::CacheKind;
use covenant_cache::DecisionCache;
use covenant_core::AuditActor;
use covenant_core::AuditEventDraft;
use covenant_core::AuditEventKind;
use covenant_core::BundleId;
use covenant_core::BundleVersion;
use covenant_core::ConstitutionalTag;
use covenant_core::DecisionRecord;
use covenant_core::DecisionRequest;
use covenant_core::EvaluationTrace;
use covenant_core::HashDigest;
use covenant_core::RuleId;
use covenant_core::Timestamp;
use covenant_core::interfaces::AuditSink;
use covenant_core::interfaces::PolicyEngine;
use covenant_core::interfaces::PolicyError;
use covenant_core::interfaces::RuleSourceFile;
use covenant_rules::Rule;
use covenant_rules::Verdict;
use covenant_rules::evaluate_rule;
use serde_json::json;
use tracing::debug;
use tracing::warn;

use crate::bundle::BundleManifest;
use crate::bundle::BundleState;
use crate::bundle::BundleStore;
use crate::compile::compile;
use crate::telemetry::EngineMetrics;
use crate::telemetry::EngineMetricsSnapshot;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Policy engine configuration.
///
/// # Invariants
/// - Latency targets are carried for reporting; enforcement is by tests.
#[derive(Debug, Clone)]
pub struct PolicyEngineConfig {
    /// Constitutional tag verified on requests and stamped on decisions.
    pub tag: ConstitutionalTag,
    /// Bundle store root directory.
    pub bundle_dir: std::path::PathBuf,
    /// Default decision TTL in milliseconds.
    pub default_ttl_millis: u64,
    /// Maximum evaluations per second before rate limiting.
    pub max_rps: u32,
    /// Verdict returned when no clause in the bundle fires.
    pub default_verdict: Verdict,
}

impl Default for PolicyEngineConfig {
    fn default() -> Self {
        Self {
            tag: ConstitutionalTag::deployment_default(),
            bundle_dir: std::path::PathBuf::from("bundles"),
            default_ttl_millis: 300_000,
            max_rps: 10_000,
            default_verdict: Verdict::RequireReview,
        }
    }
}

// ============================================================================
// SECTION: Compiled Bundles
// ============================================================================

/// Compiled, evaluable bundle snapshot.
///
/// # Invariants
/// - Immutable once built; shared by `Arc` across evaluators.
#[derive(Debug)]
struct CompiledBundle {
    /// Content-addressed bundle identifier.
    bundle_id: BundleId,
    /// Version assigned at staging.
    version: BundleVersion,
    /// Parsed rules in manifest order.
    rules: Vec<(RuleId, Rule)>,
    /// Verdict when no clause fires anywhere in the bundle.
    default_verdict: Verdict,
}

/// Rate-limit window state.
#[derive(Debug)]
struct RateWindow {
    /// Window start.
    started: Instant,
    /// Evaluations admitted in the window.
    count: u32,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Policy evaluation engine.
///
/// # Invariants
/// - Exactly one bundle is active at any instant.
/// - Readers never block the activation path (RCU snapshot reads).
pub struct PolicyEvaluationEngine {
    /// Engine configuration.
    config: PolicyEngineConfig,
    /// Disk-backed bundle store.
    store: BundleStore,
    /// Active bundle pointer (single-writer, many-reader).
    active: RwLock<Arc<CompiledBundle>>,
    /// Bundle lifecycle states.
    states: RwLock<BTreeMap<BundleId, BundleState>>,
    /// Compiled bundles addressable for activation or rollback.
    compiled: RwLock<BTreeMap<BundleId, Arc<CompiledBundle>>>,
    /// Next version ordinal.
    next_ordinal: AtomicU64,
    /// Rate-limit window.
    rate: Mutex<RateWindow>,
    /// Optional decision cache.
    cache: Option<Arc<DecisionCache>>,
    /// Optional audit sink for bundle swaps.
    audit: Option<Arc<dyn AuditSink>>,
    /// Evaluation metrics.
    metrics: EngineMetrics,
}

impl PolicyEvaluationEngine {
    /// Creates an engine with an empty genesis bundle active.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Storage`] when the bundle store cannot open.
    pub fn new(
        config: PolicyEngineConfig,
        cache: Option<Arc<DecisionCache>>,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Result<Self, PolicyError> {
        let store = BundleStore::open(&config.bundle_dir)?;
        let genesis = Arc::new(CompiledBundle {
            bundle_id: BundleId::new("genesis"),
            version: BundleVersion::new(1, "genesis"),
            rules: Vec::new(),
            default_verdict: config.default_verdict,
        });
        let mut states = BTreeMap::new();
        states.insert(genesis.bundle_id.clone(), BundleState::Active);
        Ok(Self {
            config,
            store,
            active: RwLock::new(Arc::clone(&genesis)),
            states: RwLock::new(states),
            compiled: RwLock::new(BTreeMap::new()),
            next_ordinal: AtomicU64::new(2),
            rate: Mutex::new(RateWindow {
                started: Instant::now(),
                count: 0,
            }),
            cache,
            audit,
            metrics: EngineMetrics::default(),
        })
    }

    /// Compiles and stages sources as a pending, content-addressed bundle.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Compilation`] when any source fails
    /// validation (nothing is staged) and [`PolicyError::Storage`] on
    /// persistence failures.
    pub fn stage(&self, sources: &[RuleSourceFile]) -> Result<BundleId, PolicyError> {
        let outcome = compile(sources, &self.config.tag);
        if !outcome.all_valid() {
            let detail = outcome
                .validations
                .iter()
                .filter(|validation| !validation.is_valid())
                .map(|validation| format!("{}: {}", validation.name, validation.errors.join("; ")))
                .collect::<Vec<_>>()
                .join(" | ");
            return Err(PolicyError::Compilation {
                detail,
            });
        }

        let ordinal = self.next_ordinal.fetch_add(1, Ordering::SeqCst);
        let version = BundleVersion::new(ordinal, format!("v{ordinal}"));
        let manifest = BundleManifest::build(
            sources,
            outcome.framework_mix.clone(),
            self.config.tag.clone(),
            Timestamp::now(),
            version.clone(),
        )?;
        let bundle_id = manifest.bundle_id();
        {
            // Staging is content-addressed and idempotent: identical content
            // resolves to the existing bundle without disturbing its state.
            let states = self
                .states
                .read()
                .map_err(|_| PolicyError::Storage("state registry poisoned".to_string()))?;
            if states.contains_key(&bundle_id) {
                return Ok(bundle_id);
            }
        }
        let bundle_id = self.store.persist(&manifest, sources)?;

        let compiled = Arc::new(CompiledBundle {
            bundle_id: bundle_id.clone(),
            version,
            rules: outcome
                .rules()
                .into_iter()
                .map(|(_, rule)| (RuleId::new(rule.package.clone()), rule))
                .collect(),
            default_verdict: self.config.default_verdict,
        });
        self.compiled
            .write()
            .map_err(|_| PolicyError::Storage("compiled registry poisoned".to_string()))?
            .insert(bundle_id.clone(), compiled);
        self.states
            .write()
            .map_err(|_| PolicyError::Storage("state registry poisoned".to_string()))?
            .insert(bundle_id.clone(), BundleState::Pending);
        Ok(bundle_id)
    }

    /// Activates a pending bundle, retiring the previously active one.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::UnknownBundle`] for unknown identifiers and
    /// [`PolicyError::Storage`] when the bundle is not pending.
    pub async fn activate_bundle(&self, bundle_id: &BundleId)
    -> Result<BundleVersion, PolicyError> {
        self.swap_active(bundle_id, BundleState::Pending, "activate").await
    }

    /// Rolls back to a retired bundle, retiring the currently active one.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::UnknownBundle`] for unknown identifiers and
    /// [`PolicyError::Storage`] when the bundle is not retired.
    pub async fn rollback(&self, bundle_id: &BundleId) -> Result<BundleVersion, PolicyError> {
        self.swap_active(bundle_id, BundleState::Retired, "rollback").await
    }

    /// Atomically swaps the active pointer to `bundle_id`.
    async fn swap_active(
        &self,
        bundle_id: &BundleId,
        expected_state: BundleState,
        operation: &str,
    ) -> Result<BundleVersion, PolicyError> {
        let incoming = {
            let compiled = self
                .compiled
                .read()
                .map_err(|_| PolicyError::Storage("compiled registry poisoned".to_string()))?;
            Arc::clone(
                compiled
                    .get(bundle_id)
                    .ok_or_else(|| PolicyError::UnknownBundle(bundle_id.to_string()))?,
            )
        };

        let retired_id = {
            let mut states = self
                .states
                .write()
                .map_err(|_| PolicyError::Storage("state registry poisoned".to_string()))?;
            let current = states
                .get(bundle_id)
                .copied()
                .ok_or_else(|| PolicyError::UnknownBundle(bundle_id.to_string()))?;
            if current != expected_state {
                return Err(PolicyError::Storage(format!(
                    "bundle {bundle_id} is {}, expected {}",
                    current.as_str(),
                    expected_state.as_str()
                )));
            }

            let mut active = self
                .active
                .write()
                .map_err(|_| PolicyError::Storage("active pointer poisoned".to_string()))?;
            let previous = Arc::clone(&active);
            *active = Arc::clone(&incoming);
            drop(active);

            states.insert(previous.bundle_id.clone(), BundleState::Retired);
            states.insert(bundle_id.clone(), BundleState::Active);
            previous.bundle_id.clone()
        };

        if let Some(audit) = &self.audit {
            let draft = AuditEventDraft {
                actor: AuditActor::PolicyEngine,
                kind: AuditEventKind::BundleSwap,
                payload: json!({
                    "operation": operation,
                    "activated": bundle_id.as_str(),
                    "retired": retired_id.as_str(),
                    "version": incoming.version.to_string(),
                }),
                timestamp: Timestamp::now(),
                tag: self.config.tag.clone(),
            };
            if let Err(err) = audit.append(draft).await {
                warn!(error = %err, "failed to audit bundle swap");
            }
        }
        Ok(incoming.version.clone())
    }

    /// Returns the lifecycle state of a bundle.
    pub fn bundle_state(&self, bundle_id: &BundleId) -> Option<BundleState> {
        self.states.read().ok().and_then(|states| states.get(bundle_id).copied())
    }

    /// Returns the active bundle's version.
    #[must_use]
    pub fn active_version(&self) -> BundleVersion {
        self.active
            .read()
            .map_or_else(|_| BundleVersion::new(0, "poisoned"), |active| active.version.clone())
    }

    /// Reloads a bundle from disk and verifies it matches its digests.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the bundle is missing or corrupt.
    pub fn reload(&self, bundle_id: &BundleId)
    -> Result<(BundleManifest, Vec<RuleSourceFile>), PolicyError> {
        self.store.load(bundle_id)
    }

    /// Returns an engine metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> EngineMetricsSnapshot {
        let ordinal =
            self.active.read().map_or(0, |active| active.version.ordinal);
        self.metrics.snapshot(ordinal)
    }

    /// Evaluates one request against the active bundle.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ConstitutionalMismatch`] for a tag mismatch,
    /// [`PolicyError::RateLimited`] beyond the configured RPS, and
    /// [`PolicyError::Evaluation`] for internal failures (which callers
    /// must treat as `require_review`, never allow).
    pub async fn evaluate_request(&self, request: &DecisionRequest)
    -> Result<DecisionRecord, PolicyError> {
        if request.tag != self.config.tag {
            return Err(PolicyError::ConstitutionalMismatch(request.tag.to_string()));
        }
        self.admit()?;

        let fingerprint =
            request.fingerprint().map_err(|err| PolicyError::Evaluation(err.to_string()))?;
        let cache_key = format!("decision:{}", fingerprint.value);

        if let Some(cache) = &self.cache
            && let Some(entry) = cache.get(&cache_key).await
            && let Ok(record) = serde_json::from_value::<DecisionRecord>(entry.value)
            && record.verify_integrity().unwrap_or(false)
        {
            self.metrics.record(record.verdict, record.latency_micros, true);
            return Ok(record);
        }

        let bundle = {
            let active = self
                .active
                .read()
                .map_err(|_| PolicyError::Evaluation("active pointer poisoned".to_string()))?;
            Arc::clone(&active)
        };

        let started = Instant::now();
        let mut trace = Vec::with_capacity(bundle.rules.len());
        let mut winner: Option<(usize, u8, Verdict)> = None;
        for (rule_id, rule) in &bundle.rules {
            let outcome = evaluate_rule(rule, &request.attributes);
            if let Some(clause_index) = outcome.winning_clause {
                let specificity = outcome
                    .trace
                    .iter()
                    .find(|entry| entry.clause_index == clause_index)
                    .map_or(0, |entry| entry.specificity);
                let candidate = (specificity, outcome.verdict.precedence(), outcome.verdict);
                if winner.is_none_or(|(best_spec, best_prec, _)| {
                    (specificity, outcome.verdict.precedence()) > (best_spec, best_prec)
                }) {
                    winner = Some(candidate);
                }
            }
            trace.push(EvaluationTrace {
                rule_id: rule_id.clone(),
                verdict: outcome.verdict,
                winning_clause: outcome.winning_clause,
                incomplete: outcome.incomplete,
            });
        }
        let verdict = winner.map_or(bundle.default_verdict, |(_, _, verdict)| verdict);
        let latency_micros =
            u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

        let mut record = DecisionRecord {
            fingerprint,
            verdict,
            trace,
            latency_micros,
            bundle_version: bundle.version.clone(),
            tag: self.config.tag.clone(),
            decided_at: Timestamp::now(),
            ttl_millis: self.config.default_ttl_millis,
            integrity: HashDigest::genesis(),
        };
        record.integrity =
            record.compute_integrity().map_err(|err| PolicyError::Evaluation(err.to_string()))?;

        if let Some(cache) = &self.cache {
            let value = serde_json::to_value(&record)
                .map_err(|err| PolicyError::Evaluation(err.to_string()))?;
            if let Err(err) = cache
                .set(&cache_key, value, CacheKind::Decision, Some(record.ttl_millis))
                .await
            {
                debug!(error = %err, "decision cache write failed");
            }
        }

        self.metrics.record(verdict, latency_micros, false);
        Ok(record)
    }

    /// Admits one evaluation under the RPS limit.
    fn admit(&self) -> Result<(), PolicyError> {
        let mut window = self
            .rate
            .lock()
            .map_err(|_| PolicyError::Evaluation("rate window poisoned".to_string()))?;
        if window.started.elapsed().as_millis() >= 1_000 {
            window.started = Instant::now();
            window.count = 0;
        }
        if window.count >= self.config.max_rps {
            return Err(PolicyError::RateLimited);
        }
        window.count += 1;
        Ok(())
    }
}

// ============================================================================
// SECTION: Interface Implementation
// ============================================================================

#[async_trait]
impl PolicyEngine for PolicyEvaluationEngine {
    async fn evaluate(&self, request: &DecisionRequest) -> Result<DecisionRecord, PolicyError> {
        self.evaluate_request(request).await
    }

    async fn stage_bundle(&self, sources: &[RuleSourceFile]) -> Result<BundleId, PolicyError> {
        self.stage(sources)
    }

    async fn activate(&self, bundle_id: &BundleId) -> Result<BundleVersion, PolicyError> {
        self.activate_bundle(bundle_id).await
    }
}
