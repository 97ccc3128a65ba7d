// crates/covenant-synthesis/tests/coordinator.rs
// ============================================================================
// Module: Synthesis Coordinator Tests
// Description: Validate fan-out, strategies, bias handling, and failures.
// Purpose: Ensure the ensemble degrades gracefully and flags honestly.
// Dependencies: covenant-synthesis, covenant-core, tokio
// ============================================================================

//! Ensemble behavior tests over scripted model backends.

use std::sync::Arc;
use std::time::Duration;

use covenant_core::BiasDimension;
use covenant_core::CandidateId;
use covenant_core::ConstitutionalTag;
use covenant_core::EnsembleStrategy;
use covenant_core::SynthesisRequest;
use covenant_core::interfaces::SynthesisError;
use covenant_synthesis::ModelBackend;
use covenant_synthesis::ScriptedBackend;
use covenant_synthesis::SynthesisCoordinator;
use covenant_synthesis::SynthesisCoordinatorConfig;
use serde_json::Map;

/// Builds a synthesis request with the given strategy override.
fn request(strategy: Option<EnsembleStrategy>) -> SynthesisRequest {
    SynthesisRequest {
        candidate_id: CandidateId::new("cand-1"),
        prompt: "draft a policy".to_string(),
        context: Map::new(),
        strategy,
        tag: ConstitutionalTag::deployment_default(),
    }
}

/// Builds a coordinator over the given backends with a short timeout.
fn coordinator(backends: Vec<Arc<dyn ModelBackend>>, strict_bias: bool)
-> SynthesisCoordinator {
    SynthesisCoordinator::new(
        SynthesisCoordinatorConfig {
            model_timeout: Duration::from_millis(200),
            strict_bias,
            ..SynthesisCoordinatorConfig::default()
        },
        backends,
    )
}

/// The standard three-model pool: reasoner, constitutional, adversarial.
fn standard_pool() -> Vec<Arc<dyn ModelBackend>> {
    vec![
        Arc::new(ScriptedBackend::new("reasoner", "allow compliant changes", 0.9, 0.93)),
        Arc::new(ScriptedBackend::new("constitutional", "allow compliant changes", 0.85, 0.97)),
        Arc::new(ScriptedBackend::new("adversarial", "deny risky changes", 0.7, 0.9)),
    ]
}

#[tokio::test]
async fn ensemble_reconciles_and_preserves_all_responses()
-> Result<(), Box<dyn std::error::Error>> {
    let coordinator = coordinator(standard_pool(), false);
    let outcome = coordinator.run(&request(None)).await?;
    assert_eq!(outcome.responses.len(), 3);
    assert!(outcome.confidence > 0.0);
    assert!(outcome.compliance > 0.9);
    assert_eq!(outcome.tag.as_str(), "cdd01ef066bc6cf2");
    Ok(())
}

#[tokio::test]
async fn constitutional_priority_lets_the_compliant_model_dominate()
-> Result<(), Box<dyn std::error::Error>> {
    let coordinator = coordinator(standard_pool(), false);
    let outcome = coordinator
        .run(&request(Some(EnsembleStrategy::ConstitutionalPriority)))
        .await?;
    // The constitutional model (compliance 0.97 >= 0.9) wins the content.
    assert_eq!(outcome.content, "allow compliant changes");
    assert!(outcome.compliance > 0.95);
    assert!(!outcome.review_recommended);
    Ok(())
}

#[tokio::test]
async fn majority_vote_picks_the_plurality_content()
-> Result<(), Box<dyn std::error::Error>> {
    let coordinator = coordinator(standard_pool(), false);
    let outcome = coordinator.run(&request(Some(EnsembleStrategy::MajorityVote))).await?;
    assert_eq!(outcome.content, "allow compliant changes");
    Ok(())
}

#[tokio::test]
async fn low_compliance_outcomes_are_flagged_for_review()
-> Result<(), Box<dyn std::error::Error>> {
    let pool: Vec<Arc<dyn ModelBackend>> = vec![
        Arc::new(ScriptedBackend::new("a", "draft", 0.9, 0.8)),
        Arc::new(ScriptedBackend::new("b", "draft", 0.9, 0.85)),
    ];
    let coordinator = coordinator(pool, false);
    let outcome = coordinator.run(&request(None)).await?;
    assert!(outcome.compliance < 0.95);
    assert!(outcome.review_recommended);
    Ok(())
}

#[tokio::test]
async fn ensemble_proceeds_when_one_model_times_out()
-> Result<(), Box<dyn std::error::Error>> {
    let pool: Vec<Arc<dyn ModelBackend>> = vec![
        Arc::new(ScriptedBackend::new("fast-a", "draft", 0.9, 0.96)),
        Arc::new(ScriptedBackend::new("fast-b", "draft", 0.88, 0.96)),
        Arc::new(
            ScriptedBackend::new("slow", "late draft", 0.99, 0.99)
                .with_delay(Duration::from_secs(5)),
        ),
    ];
    let coordinator = coordinator(pool, false);
    let outcome = coordinator.run(&request(None)).await?;
    assert_eq!(outcome.responses.len(), 2);
    assert!(outcome.responses.iter().all(|response| response.model_id.as_str() != "slow"));
    Ok(())
}

#[tokio::test]
async fn fewer_than_two_responders_is_insufficient() -> Result<(), Box<dyn std::error::Error>> {
    let pool: Vec<Arc<dyn ModelBackend>> = vec![
        Arc::new(ScriptedBackend::new("only", "draft", 0.9, 0.96)),
        Arc::new(ScriptedBackend::new("broken", "x", 0.9, 0.9).failing("backend down")),
    ];
    let coordinator = coordinator(pool, false);
    let result = coordinator.run(&request(None)).await;
    assert!(matches!(
        result,
        Err(SynthesisError::InsufficientEnsemble {
            responded: 1,
            required: 2,
        })
    ));
    Ok(())
}

#[tokio::test]
async fn empty_ensemble_is_insufficient() -> Result<(), Box<dyn std::error::Error>> {
    let pool: Vec<Arc<dyn ModelBackend>> = vec![
        Arc::new(ScriptedBackend::new("a", "x", 0.9, 0.9).failing("down")),
        Arc::new(ScriptedBackend::new("b", "x", 0.9, 0.9).failing("down")),
    ];
    let coordinator = coordinator(pool, false);
    let result = coordinator.run(&request(None)).await;
    assert!(matches!(result, Err(SynthesisError::InsufficientEnsemble { .. })));
    Ok(())
}

#[tokio::test]
async fn bias_mitigation_records_both_vectors() -> Result<(), Box<dyn std::error::Error>> {
    let pool: Vec<Arc<dyn ModelBackend>> = vec![
        Arc::new(ScriptedBackend::new("clean", "draft", 0.9, 0.96)),
        Arc::new(ScriptedBackend::new("clean-too", "draft", 0.9, 0.96)),
        Arc::new(
            ScriptedBackend::new("skewed", "draft", 0.9, 0.96)
                .with_bias(BiasDimension::Demographic, 0.9),
        ),
    ];
    let coordinator = coordinator(pool, false);
    let outcome = coordinator.run(&request(None)).await?;
    let before = outcome.bias_before.score(BiasDimension::Demographic);
    let after = outcome.bias_after.score(BiasDimension::Demographic);
    assert!(before > after, "mitigation should reduce bias: {before} -> {after}");
    assert!(outcome.unresolved_bias.is_empty());
    Ok(())
}

#[tokio::test]
async fn strict_bias_mode_fails_on_unresolved_dimensions()
-> Result<(), Box<dyn std::error::Error>> {
    let pool: Vec<Arc<dyn ModelBackend>> = vec![
        Arc::new(
            ScriptedBackend::new("a", "draft", 0.9, 0.96)
                .with_bias(BiasDimension::Confirmation, 0.95),
        ),
        Arc::new(
            ScriptedBackend::new("b", "draft", 0.9, 0.96)
                .with_bias(BiasDimension::Confirmation, 0.9),
        ),
    ];
    let coordinator = coordinator(pool, true);
    let result = coordinator.run(&request(None)).await;
    assert!(matches!(result, Err(SynthesisError::BiasThresholdExceeded { .. })));
    Ok(())
}

#[tokio::test]
async fn mismatched_tag_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = coordinator(standard_pool(), false);
    let mut bad = request(None);
    bad.tag = ConstitutionalTag::parse("0123456789abcdef")?;
    let result = coordinator.run(&bad).await;
    assert!(matches!(result, Err(SynthesisError::ConstitutionalMismatch(_))));
    Ok(())
}
