// crates/covenant-config/src/config.rs
// ============================================================================
// Module: Covenant Configuration
// Description: Configuration loading and validation for the governance runtime.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: covenant-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing options fall back to defaults; invalid options fail closed. Every
//! spec-surfaced knob lives here, grouped by the component it drives.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use covenant_core::BiasDimension;
use covenant_core::ConstitutionalTag;
use covenant_core::EnsembleStrategy;
use covenant_core::SandboxRuntimeKind;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "covenant.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "COVENANT_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum L1 cache capacity accepted by validation.
pub const MAX_L1_CAPACITY: usize = 1_048_576;
/// Maximum verification worker count accepted by validation.
pub const MAX_VERIFICATION_WORKERS: usize = 512;
/// Maximum sandbox concurrency accepted by validation.
pub const MAX_SANDBOX_CONCURRENT: usize = 4_096;
/// Strict evaluation latency target in milliseconds (spec default).
pub const DEFAULT_LATENCY_TARGET_STRICT_MS: u64 = 5;
/// Relaxed evaluation latency target in milliseconds.
pub const DEFAULT_LATENCY_TARGET_RELAXED_MS: u64 = 500;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing failed.
    #[error("config parse error: {0}")]
    Parse(String),
    /// A field failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Root Configuration
// ============================================================================

/// Root configuration for the Covenant runtime.
///
/// # Invariants
/// - `validate` has been called before components consume the value.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct CovenantConfig {
    /// Constitutional tag verified at every boundary.
    #[serde(default)]
    pub constitutional_identifier: Option<String>,
    /// Policy engine options.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Decision cache options.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Verification pipeline options.
    #[serde(default)]
    pub verification: VerificationConfig,
    /// Synthesis coordinator options.
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    /// Bandit optimizer options.
    #[serde(default)]
    pub bandit: BanditConfig,
    /// Sandbox controller options.
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// Human review options.
    #[serde(default)]
    pub review: ReviewConfig,
    /// Audit log options.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Ingress server options.
    #[serde(default)]
    pub server: ServerConfig,
}

impl CovenantConfig {
    /// Loads configuration from the given path, the `COVENANT_CONFIG`
    /// environment variable, or `covenant.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when reading, parsing, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path);
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] on the first failing field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(raw) = &self.constitutional_identifier {
            ConstitutionalTag::parse(raw.clone())
                .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        }
        self.policy.validate()?;
        self.cache.validate()?;
        self.verification.validate()?;
        self.synthesis.validate()?;
        self.bandit.validate()?;
        self.sandbox.validate()?;
        self.review.validate()?;
        self.audit.validate()?;
        self.server.validate()?;
        Ok(())
    }

    /// Returns the configured constitutional tag, defaulting to the
    /// deployment default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the configured tag is
    /// malformed.
    pub fn constitutional_tag(&self) -> Result<ConstitutionalTag, ConfigError> {
        match &self.constitutional_identifier {
            Some(raw) => ConstitutionalTag::parse(raw.clone())
                .map_err(|err| ConfigError::Invalid(err.to_string())),
            None => Ok(ConstitutionalTag::deployment_default()),
        }
    }
}

/// Resolves the configuration path from argument, environment, or default.
fn resolve_path(path: Option<&Path>) -> PathBuf {
    path.map_or_else(
        || {
            env::var_os(CONFIG_ENV_VAR)
                .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_NAME), PathBuf::from)
        },
        Path::to_path_buf,
    )
}

// ============================================================================
// SECTION: Policy Engine
// ============================================================================

/// Policy engine configuration.
///
/// # Invariants
/// - Latency targets and RPS limits are positive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PolicyConfig {
    /// Directory where pending/active/retired bundles live.
    pub bundle_dir: PathBuf,
    /// Strict P99 evaluation latency target in milliseconds.
    pub latency_target_strict_ms: u64,
    /// Relaxed evaluation latency target in milliseconds.
    pub latency_target_relaxed_ms: u64,
    /// Maximum evaluations per second before rate limiting.
    pub evaluation_max_rps: u32,
    /// Compliance score required for automatic allow (bundle-resident
    /// default used when a bundle does not carry its own).
    pub auto_allow_compliance: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            bundle_dir: PathBuf::from("bundles"),
            latency_target_strict_ms: DEFAULT_LATENCY_TARGET_STRICT_MS,
            latency_target_relaxed_ms: DEFAULT_LATENCY_TARGET_RELAXED_MS,
            evaluation_max_rps: 10_000,
            auto_allow_compliance: 0.95,
        }
    }
}

impl PolicyConfig {
    /// Validates the policy section.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.bundle_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("policy.bundle_dir must be set".to_string()));
        }
        if self.latency_target_strict_ms == 0 {
            return Err(ConfigError::Invalid(
                "policy.latency_target_strict_ms must be positive".to_string(),
            ));
        }
        if self.latency_target_relaxed_ms < self.latency_target_strict_ms {
            return Err(ConfigError::Invalid(
                "policy.latency_target_relaxed_ms must be >= the strict target".to_string(),
            ));
        }
        if self.evaluation_max_rps == 0 {
            return Err(ConfigError::Invalid(
                "policy.evaluation_max_rps must be positive".to_string(),
            ));
        }
        if !(0.0 ..= 1.0).contains(&self.auto_allow_compliance) {
            return Err(ConfigError::Invalid(
                "policy.auto_allow_compliance must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Decision Cache
// ============================================================================

/// Decision cache configuration.
///
/// # Invariants
/// - Capacities and TTLs are positive and bounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    /// In-process L1 capacity in entries.
    pub l1_capacity: usize,
    /// Default TTL for cached entries in milliseconds.
    pub ttl_default_ms: u64,
    /// Number of L1 shards.
    pub shards: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: 10_000,
            ttl_default_ms: 300_000,
            shards: 8,
        }
    }
}

impl CacheConfig {
    /// Validates the cache section.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.l1_capacity == 0 || self.l1_capacity > MAX_L1_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "cache.l1_capacity must be within 1..={MAX_L1_CAPACITY}"
            )));
        }
        if self.ttl_default_ms == 0 {
            return Err(ConfigError::Invalid("cache.ttl_default_ms must be positive".to_string()));
        }
        if self.shards == 0 || self.shards > 256 {
            return Err(ConfigError::Invalid("cache.shards must be within 1..=256".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Verification Pipeline
// ============================================================================

/// Verification pipeline configuration.
///
/// # Invariants
/// - Worker count and timeouts are positive and bounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct VerificationConfig {
    /// Worker pool size for obligation fan-out.
    pub worker_count: usize,
    /// Per-obligation timeout in milliseconds.
    pub obligation_timeout_ms: u64,
    /// Permit falling back to a lower tier on undecided obligations.
    pub allow_tier_fallback: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            worker_count: 8,
            obligation_timeout_ms: 5_000,
            allow_tier_fallback: false,
        }
    }
}

impl VerificationConfig {
    /// Validates the verification section.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 || self.worker_count > MAX_VERIFICATION_WORKERS {
            return Err(ConfigError::Invalid(format!(
                "verification.worker_count must be within 1..={MAX_VERIFICATION_WORKERS}"
            )));
        }
        if self.obligation_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "verification.obligation_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Synthesis Coordinator
// ============================================================================

/// Synthesis coordinator configuration.
///
/// # Invariants
/// - `min_models >= 2`; thresholds are within `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SynthesisConfig {
    /// Default ensemble aggregation strategy.
    pub strategy: EnsembleStrategy,
    /// Minimum responders required to proceed.
    pub min_models: usize,
    /// Per-model call timeout in milliseconds.
    pub model_timeout_ms: u64,
    /// Aggregate compliance required for an unflagged result.
    pub unflagged_compliance: f64,
    /// Compliance threshold above which the constitutional-priority model
    /// dominates.
    pub priority_threshold: f64,
    /// Per-dimension bias thresholds.
    pub bias_thresholds: BTreeMap<BiasDimension, f64>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        let mut bias_thresholds = BTreeMap::new();
        bias_thresholds.insert(BiasDimension::Demographic, 0.15);
        bias_thresholds.insert(BiasDimension::Cultural, 0.2);
        bias_thresholds.insert(BiasDimension::Linguistic, 0.25);
        bias_thresholds.insert(BiasDimension::Temporal, 0.3);
        bias_thresholds.insert(BiasDimension::Confirmation, 0.2);
        Self {
            strategy: EnsembleStrategy::default(),
            min_models: 2,
            model_timeout_ms: 10_000,
            unflagged_compliance: 0.95,
            priority_threshold: 0.9,
            bias_thresholds,
        }
    }
}

impl SynthesisConfig {
    /// Validates the synthesis section.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_models < 2 {
            return Err(ConfigError::Invalid("synthesis.min_models must be >= 2".to_string()));
        }
        if self.model_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "synthesis.model_timeout_ms must be positive".to_string(),
            ));
        }
        for value in [self.unflagged_compliance, self.priority_threshold] {
            if !(0.0 ..= 1.0).contains(&value) {
                return Err(ConfigError::Invalid(
                    "synthesis thresholds must be within [0, 1]".to_string(),
                ));
            }
        }
        for (dimension, threshold) in &self.bias_thresholds {
            if !(0.0 ..= 1.0).contains(threshold) {
                return Err(ConfigError::Invalid(format!(
                    "synthesis.bias_thresholds.{} must be within [0, 1]",
                    dimension.as_str()
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Bandit Optimizer
// ============================================================================

/// Bandit optimizer configuration.
///
/// # Invariants
/// - Windows and sample floors are positive; thresholds within `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BanditConfig {
    /// Confidence parameter `alpha`.
    pub alpha: f64,
    /// Ridge regularization `lambda`.
    pub lambda_reg: f64,
    /// Maximum allowed drop below the baseline.
    pub safety_threshold: f64,
    /// Reward window used for the baseline percentile.
    pub baseline_window: usize,
    /// Pulls before the safety filter applies to an arm.
    pub min_baseline_samples: usize,
    /// Rounds between baseline refreshes.
    pub update_frequency: u64,
    /// Context vector dimension.
    pub context_dimension: usize,
    /// Exploration bonus scale applied to constitutional scores.
    pub exploration_bonus: f64,
    /// Fall back to the closest-to-baseline arm when no arm is safe.
    pub fallback_to_baseline: bool,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
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

impl BanditConfig {
    /// Validates the bandit section.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.alpha <= 0.0 || self.lambda_reg <= 0.0 {
            return Err(ConfigError::Invalid(
                "bandit.alpha and bandit.lambda_reg must be positive".to_string(),
            ));
        }
        if !(0.0 ..= 1.0).contains(&self.safety_threshold) {
            return Err(ConfigError::Invalid(
                "bandit.safety_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.baseline_window == 0 || self.min_baseline_samples == 0 {
            return Err(ConfigError::Invalid(
                "bandit windows and sample floors must be positive".to_string(),
            ));
        }
        if self.min_baseline_samples > self.baseline_window {
            return Err(ConfigError::Invalid(
                "bandit.min_baseline_samples must not exceed bandit.baseline_window".to_string(),
            ));
        }
        if self.update_frequency == 0 {
            return Err(ConfigError::Invalid(
                "bandit.update_frequency must be positive".to_string(),
            ));
        }
        if self.context_dimension == 0 || self.context_dimension > 64 {
            return Err(ConfigError::Invalid(
                "bandit.context_dimension must be within 1..=64".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Sandbox Controller
// ============================================================================

/// Sandbox controller configuration.
///
/// # Invariants
/// - Concurrency and grace periods are positive and bounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SandboxConfig {
    /// Default isolation runtime.
    pub runtime: SandboxRuntimeKind,
    /// Maximum concurrent executions (slot pool size).
    pub max_concurrent: usize,
    /// Cancellation grace period in milliseconds before a kill.
    pub cancel_grace_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: SandboxRuntimeKind::default(),
            max_concurrent: 16,
            cancel_grace_ms: 500,
        }
    }
}

impl SandboxConfig {
    /// Validates the sandbox section.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 || self.max_concurrent > MAX_SANDBOX_CONCURRENT {
            return Err(ConfigError::Invalid(format!(
                "sandbox.max_concurrent must be within 1..={MAX_SANDBOX_CONCURRENT}"
            )));
        }
        if self.cancel_grace_ms == 0 {
            return Err(ConfigError::Invalid(
                "sandbox.cancel_grace_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Human Review
// ============================================================================

/// Human review configuration.
///
/// # Invariants
/// - `required_approvals >= 1`; deadlines are positive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReviewConfig {
    /// Default review deadline in milliseconds.
    pub deadline_ms: i64,
    /// Default approvals required to resolve a review.
    pub required_approvals: u32,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 24 * 60 * 60 * 1000,
            required_approvals: 2,
        }
    }
}

impl ReviewConfig {
    /// Validates the review section.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.deadline_ms <= 0 {
            return Err(ConfigError::Invalid("review.deadline_ms must be positive".to_string()));
        }
        if self.required_approvals == 0 {
            return Err(ConfigError::Invalid(
                "review.required_approvals must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Audit Log
// ============================================================================

/// Audit log configuration.
///
/// # Invariants
/// - Retention windows honor the spec floors (90 / 365 days).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AuditConfig {
    /// Path of the append-only NDJSON log file.
    pub log_path: PathBuf,
    /// Retention for security events, in days.
    pub retention_security_days: u32,
    /// Retention for constitutional events, in days.
    pub retention_constitutional_days: u32,
    /// Append channel capacity.
    pub channel_capacity: usize,
    /// Alert threshold: events of one kind within the alert window.
    pub alert_threshold: u64,
    /// Alert window in milliseconds.
    pub alert_window_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("audit/covenant-audit.ndjson"),
            retention_security_days: 90,
            retention_constitutional_days: 365,
            channel_capacity: 1_024,
            alert_threshold: 100,
            alert_window_ms: 60_000,
        }
    }
}

impl AuditConfig {
    /// Validates the audit section.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.log_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("audit.log_path must be set".to_string()));
        }
        if self.retention_security_days < 90 {
            return Err(ConfigError::Invalid(
                "audit.retention_security_days must be >= 90".to_string(),
            ));
        }
        if self.retention_constitutional_days < 365 {
            return Err(ConfigError::Invalid(
                "audit.retention_constitutional_days must be >= 365".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "audit.channel_capacity must be positive".to_string(),
            ));
        }
        if self.alert_threshold == 0 || self.alert_window_ms == 0 {
            return Err(ConfigError::Invalid(
                "audit alert threshold and window must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Ingress Server
// ============================================================================

/// Ingress server configuration.
///
/// # Invariants
/// - The bind address parses as `host:port`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    /// Bind address for the HTTP surface.
    pub bind: String,
    /// Maximum in-flight requests.
    pub max_inflight: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            max_inflight: 256,
        }
    }
}

impl ServerConfig {
    /// Validates the server section.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind
            .parse::<std::net::SocketAddr>()
            .map_err(|_| ConfigError::Invalid("server.bind must be host:port".to_string()))?;
        if self.max_inflight == 0 {
            return Err(ConfigError::Invalid("server.max_inflight must be positive".to_string()));
        }
        Ok(())
    }
}
