// crates/covenant-policy/tests/engine.rs
// ============================================================================
// Module: Policy Engine Tests
// Description: Validate bundle lifecycle, evaluation, caching, and limits.
// Purpose: Ensure exactly-one-active semantics and fail-closed evaluation.
// Dependencies: covenant-policy, covenant-cache, covenant-core, tempfile, tokio
// ============================================================================

//! Policy engine behavior tests over a temporary bundle store.

use std::sync::Arc;

use covenant_cache::DecisionCache;
use covenant_cache::DecisionCacheConfig;
use covenant_core::ConstitutionalTag;
use covenant_core::DecisionRequest;
use covenant_core::interfaces::PolicyError;
use covenant_core::interfaces::RuleSourceFile;
use covenant_policy::BundleState;
use covenant_policy::PolicyEngineConfig;
use covenant_policy::PolicyEvaluationEngine;
use covenant_rules::Verdict;
use serde_json::Map;
use serde_json::json;

/// A rule allowing compliant, low-risk requests and denying critical ones.
const SAFETY_RULE: &str = r#"
package safety.core
constitution "cdd01ef066bc6cf2"
default require_review

allow {
    compliance >= 0.95
    risk == "low"
}

deny {
    risk in ["critical"]
}
"#;

/// Builds an engine over a temp dir, returning the dir guard too.
fn engine_with(
    cache: Option<Arc<DecisionCache>>,
    max_rps: u32,
) -> Result<(PolicyEvaluationEngine, tempfile::TempDir), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = PolicyEvaluationEngine::new(
        PolicyEngineConfig {
            bundle_dir: dir.path().join("bundles"),
            max_rps,
            ..PolicyEngineConfig::default()
        },
        cache,
        None,
    )?;
    Ok((engine, dir))
}

/// Builds a decision request with the given attributes.
fn request(attributes: serde_json::Value) -> DecisionRequest {
    DecisionRequest {
        action: "candidate.commit".to_string(),
        attributes: attributes.as_object().cloned().unwrap_or_else(Map::new),
        tag: ConstitutionalTag::deployment_default(),
    }
}

/// Stages and activates the safety rule, returning its bundle id.
async fn activate_safety(
    engine: &PolicyEvaluationEngine,
) -> Result<covenant_core::BundleId, Box<dyn std::error::Error>> {
    let bundle_id = engine.stage(&[RuleSourceFile {
        name: "safety.rule".to_string(),
        content: SAFETY_RULE.to_string(),
    }])?;
    engine.activate_bundle(&bundle_id).await?;
    Ok(bundle_id)
}

#[tokio::test]
async fn genesis_engine_serves_the_default_verdict() -> Result<(), Box<dyn std::error::Error>> {
    let (engine, _dir) = engine_with(None, 1_000)?;
    let record = engine.evaluate_request(&request(json!({"anything": 1}))).await?;
    assert_eq!(record.verdict, Verdict::RequireReview);
    assert!(record.trace.is_empty());
    assert!(record.verify_integrity()?);
    Ok(())
}

#[tokio::test]
async fn staged_bundle_swaps_in_and_serves_verdicts() -> Result<(), Box<dyn std::error::Error>> {
    let (engine, _dir) = engine_with(None, 1_000)?;
    let bundle_id = activate_safety(&engine).await?;
    assert_eq!(engine.bundle_state(&bundle_id), Some(BundleState::Active));

    let allow = engine
        .evaluate_request(&request(json!({"compliance": 0.97, "risk": "low"})))
        .await?;
    assert_eq!(allow.verdict, Verdict::Allow);
    assert_eq!(allow.trace.len(), 1);
    assert_eq!(allow.trace[0].winning_clause, Some(0));

    let deny = engine
        .evaluate_request(&request(json!({"compliance": 0.97, "risk": "critical"})))
        .await?;
    assert_eq!(deny.verdict, Verdict::Deny);

    let review = engine.evaluate_request(&request(json!({"risk": "low"}))).await?;
    assert_eq!(review.verdict, Verdict::RequireReview);
    assert!(review.trace[0].incomplete);
    Ok(())
}

#[tokio::test]
async fn exactly_one_bundle_is_active_across_swaps() -> Result<(), Box<dyn std::error::Error>> {
    let (engine, _dir) = engine_with(None, 1_000)?;
    let first = activate_safety(&engine).await?;

    let second_source = SAFETY_RULE.replace("safety.core", "safety.next");
    let second = engine.stage(&[RuleSourceFile {
        name: "next.rule".to_string(),
        content: second_source,
    }])?;
    engine.activate_bundle(&second).await?;

    assert_eq!(engine.bundle_state(&first), Some(BundleState::Retired));
    assert_eq!(engine.bundle_state(&second), Some(BundleState::Active));

    // Rollback restores the retired bundle and retires the current one.
    engine.rollback(&first).await?;
    assert_eq!(engine.bundle_state(&first), Some(BundleState::Active));
    assert_eq!(engine.bundle_state(&second), Some(BundleState::Retired));
    Ok(())
}

#[tokio::test]
async fn pending_bundles_cannot_be_rolled_back() -> Result<(), Box<dyn std::error::Error>> {
    let (engine, _dir) = engine_with(None, 1_000)?;
    let bundle_id = engine.stage(&[RuleSourceFile {
        name: "safety.rule".to_string(),
        content: SAFETY_RULE.to_string(),
    }])?;
    let result = engine.rollback(&bundle_id).await;
    assert!(matches!(result, Err(PolicyError::Storage(_))));
    Ok(())
}

#[tokio::test]
async fn compilation_failure_stages_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let (engine, _dir) = engine_with(None, 1_000)?;
    let result = engine.stage(&[
        RuleSourceFile {
            name: "good.rule".to_string(),
            content: SAFETY_RULE.to_string(),
        },
        RuleSourceFile {
            name: "bad.rule".to_string(),
            content: "package broken\n".to_string(),
        },
    ]);
    assert!(matches!(result, Err(PolicyError::Compilation { .. })));
    // The active bundle is still genesis.
    assert_eq!(engine.active_version().tag, "genesis");
    Ok(())
}

#[tokio::test]
async fn cached_decisions_are_served_and_verified() -> Result<(), Box<dyn std::error::Error>> {
    let cache = Arc::new(DecisionCache::new(DecisionCacheConfig::default(), None, None));
    let (engine, _dir) = engine_with(Some(Arc::clone(&cache)), 1_000)?;
    activate_safety(&engine).await?;

    let attributes = json!({"compliance": 0.97, "risk": "low"});
    let first = engine.evaluate_request(&request(attributes.clone())).await?;
    let second = engine.evaluate_request(&request(attributes)).await?;
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.verdict, second.verdict);
    assert!(engine.metrics().cache_hits >= 1);
    Ok(())
}

#[tokio::test]
async fn mismatched_request_tag_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let (engine, _dir) = engine_with(None, 1_000)?;
    let mut bad = request(json!({}));
    bad.tag = ConstitutionalTag::parse("0123456789abcdef")?;
    let result = engine.evaluate_request(&bad).await;
    assert!(matches!(result, Err(PolicyError::ConstitutionalMismatch(_))));
    Ok(())
}

#[tokio::test]
async fn rate_limit_rejects_beyond_configured_rps() -> Result<(), Box<dyn std::error::Error>> {
    let (engine, _dir) = engine_with(None, 3)?;
    for _ in 0 .. 3 {
        engine.evaluate_request(&request(json!({}))).await?;
    }
    let result = engine.evaluate_request(&request(json!({}))).await;
    assert!(matches!(result, Err(PolicyError::RateLimited)));
    Ok(())
}

#[tokio::test]
async fn bundle_store_round_trip_is_byte_identical() -> Result<(), Box<dyn std::error::Error>> {
    let (engine, _dir) = engine_with(None, 1_000)?;
    let bundle_id = engine.stage(&[RuleSourceFile {
        name: "safety.rule".to_string(),
        content: SAFETY_RULE.to_string(),
    }])?;

    let (manifest, sources) = engine.reload(&bundle_id)?;
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].content, SAFETY_RULE);
    assert_eq!(manifest.bundle_id(), bundle_id);

    // Re-staging identical content is content-addressed to the same id.
    let restaged = engine.stage(&sources)?;
    assert_eq!(restaged, bundle_id);
    Ok(())
}
