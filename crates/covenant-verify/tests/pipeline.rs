// crates/covenant-verify/tests/pipeline.rs
// ============================================================================
// Module: Verification Pipeline Tests
// Description: Validate tiered obligations, caching, timeouts, and proofs.
// Purpose: Ensure verification proves, disproves, and surfaces unknowns.
// Dependencies: covenant-verify, covenant-cache, covenant-core, tokio
// ============================================================================

//! Pipeline behavior tests across the three tiers.

use std::sync::Arc;
use std::time::Duration;

use covenant_cache::DecisionCache;
use covenant_cache::DecisionCacheConfig;
use covenant_core::ObligationStatus;
use covenant_core::PropertyId;
use covenant_core::PropertySpec;
use covenant_core::VerificationTier;
use covenant_core::interfaces::RuleSourceFile;
use covenant_core::interfaces::Verifier;
use covenant_verify::VerificationPipeline;
use covenant_verify::VerificationPipelineConfig;
use covenant_verify::default_properties;

/// A rule that honors the compliance floor and denies critical risk.
const SAFE_RULE: &str = r#"
package safety.core
constitution "cdd01ef066bc6cf2"
default require_review

allow {
    compliance >= 0.95
    not risk == "critical"
}

deny {
    risk in ["critical"]
}
"#;

/// A rule whose allow clause violates the compliance floor.
const UNSAFE_RULE: &str = r#"
package safety.loose
constitution "cdd01ef066bc6cf2"
default require_review

allow {
    compliance >= 0.5
}
"#;

/// Builds a source file.
fn source(name: &str, content: &str) -> RuleSourceFile {
    RuleSourceFile {
        name: name.to_string(),
        content: content.to_string(),
    }
}

/// Builds a pipeline with the given timeout and optional cache.
fn pipeline(timeout: Duration, cache: Option<Arc<DecisionCache>>) -> VerificationPipeline {
    VerificationPipeline::new(
        VerificationPipelineConfig {
            worker_count: 4,
            obligation_timeout: timeout,
            ..VerificationPipelineConfig::default()
        },
        cache,
    )
}

#[tokio::test]
async fn safe_rule_proves_the_full_catalog_at_rigorous()
-> Result<(), Box<dyn std::error::Error>> {
    let pipeline = pipeline(Duration::from_secs(5), None);
    let report = pipeline
        .verify(
            &[source("safety.rule", SAFE_RULE)],
            &default_properties(),
            VerificationTier::Rigorous,
        )
        .await?;
    assert!(report.fully_proved(), "unexpected report: {report:?}");
    // Structure plus all four catalog properties.
    assert_eq!(report.obligations.len(), 5);
    Ok(())
}

#[tokio::test]
async fn compliance_floor_violation_is_disproved_with_witness()
-> Result<(), Box<dyn std::error::Error>> {
    let pipeline = pipeline(Duration::from_secs(5), None);
    let report = pipeline
        .verify(
            &[source("loose.rule", UNSAFE_RULE)],
            &default_properties(),
            VerificationTier::Rigorous,
        )
        .await?;
    assert_eq!(report.aggregate, ObligationStatus::Disproved);
    let disproved = report
        .obligations
        .iter()
        .find(|obligation| obligation.status == ObligationStatus::Disproved)
        .ok_or("missing disproved obligation")?;
    assert_eq!(disproved.property_id.as_str(), "compliance_floor");
    // The counter-example witness names the violating compliance value.
    assert!(disproved.evidence.as_deref().is_some_and(|text| text.contains("compliance")));
    Ok(())
}

#[tokio::test]
async fn request_tier_scopes_the_obligation_set() -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = pipeline(Duration::from_secs(5), None);
    let automated = pipeline
        .verify(
            &[source("safety.rule", SAFE_RULE)],
            &default_properties(),
            VerificationTier::Automated,
        )
        .await?;
    // Automated: structure only.
    assert_eq!(automated.obligations.len(), 1);
    assert!(automated.fully_proved());

    let semantic = pipeline
        .verify(
            &[source("safety.rule", SAFE_RULE)],
            &default_properties(),
            VerificationTier::Semantic,
        )
        .await?;
    // Semantic adds no_deadlock and bounded_response, not the numeric
    // witness properties.
    assert_eq!(semantic.obligations.len(), 3);
    assert!(semantic.fully_proved());
    Ok(())
}

#[tokio::test]
async fn malformed_rule_fails_the_structural_obligation()
-> Result<(), Box<dyn std::error::Error>> {
    let pipeline = pipeline(Duration::from_secs(5), None);
    let report = pipeline
        .verify(
            &[source("broken.rule", "package broken\n")],
            &default_properties(),
            VerificationTier::Rigorous,
        )
        .await?;
    assert_eq!(report.aggregate, ObligationStatus::Disproved);
    assert_eq!(report.obligations.len(), 1);
    assert_eq!(report.obligations[0].property_id.as_str(), "structure");
    Ok(())
}

#[tokio::test]
async fn unknown_property_surfaces_as_unknown() -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = pipeline(Duration::from_secs(5), None);
    let report = pipeline
        .verify(
            &[source("safety.rule", SAFE_RULE)],
            &[PropertySpec {
                property_id: PropertyId::new("termination_in_omega"),
                description: "not in the catalog".to_string(),
                requires_numeric_witness: true,
            }],
            VerificationTier::Rigorous,
        )
        .await?;
    assert_eq!(report.aggregate, ObligationStatus::Unknown);
    assert!(report.has_undecided());
    Ok(())
}

#[tokio::test]
async fn zero_timeout_yields_timeout_not_proved() -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = pipeline(Duration::from_millis(0), None);
    let report = pipeline
        .verify(
            &[source("safety.rule", SAFE_RULE)],
            &default_properties(),
            VerificationTier::Rigorous,
        )
        .await?;
    assert_eq!(report.aggregate, ObligationStatus::Timeout);
    assert!(!report.fully_proved());
    Ok(())
}

#[tokio::test]
async fn stable_outcomes_hit_the_cache_on_repeat() -> Result<(), Box<dyn std::error::Error>> {
    let cache = Arc::new(DecisionCache::new(DecisionCacheConfig::default(), None, None));
    let pipeline = pipeline(Duration::from_secs(5), Some(cache));
    let sources = [source("safety.rule", SAFE_RULE)];

    let first = pipeline
        .verify(&sources, &default_properties(), VerificationTier::Rigorous)
        .await?;
    assert_eq!(first.cache_hits, 0);

    let second = pipeline
        .verify(&sources, &default_properties(), VerificationTier::Rigorous)
        .await?;
    assert_eq!(second.cache_hits, 4);
    assert!(second.fully_proved());
    Ok(())
}

#[tokio::test]
async fn proof_objects_carry_steps_or_counter_examples()
-> Result<(), Box<dyn std::error::Error>> {
    let pipeline = pipeline(Duration::from_secs(5), None);
    let floor = PropertySpec {
        property_id: PropertyId::new("compliance_floor"),
        description: "allow is unreachable below the compliance floor".to_string(),
        requires_numeric_witness: true,
    };

    let proved = pipeline.generate_proof(&source("safety.rule", SAFE_RULE), &floor)?;
    assert!(proved.counter_example.is_none());
    assert!(proved.steps.iter().any(|step| step.contains("proved")));
    assert_eq!(proved.tag.as_str(), "cdd01ef066bc6cf2");

    let disproved = pipeline.generate_proof(&source("loose.rule", UNSAFE_RULE), &floor)?;
    assert!(disproved.counter_example.is_some());
    Ok(())
}
