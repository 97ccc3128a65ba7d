// crates/covenant-rules/tests/proptest_rules.rs
// ============================================================================
// Module: Rule Property Tests
// Description: Property-based checks for parser totality and eval soundness.
// Purpose: Ensure the parser never panics and evaluation stays fail-closed.
// Dependencies: covenant-rules, proptest, serde_json
// ============================================================================

//! Property tests: arbitrary input never panics the parser, and clause
//! outcomes are sound with respect to tri-state semantics.

use covenant_rules::Truth;
use covenant_rules::evaluate_rule;
use covenant_rules::parse_rule;
use proptest::prelude::ProptestConfig;
use proptest::prelude::any;
use proptest::prelude::prop;
use proptest::prop_assert;
use proptest::prop_assert_eq;
use proptest::proptest;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Arbitrary byte soup must produce an error or a rule, never a panic.
    #[test]
    fn parser_is_total(input in any::<String>()) {
        let _ = parse_rule(&input);
    }

    /// A numeric threshold clause fires exactly when the attribute clears it.
    #[test]
    fn threshold_clause_is_sound(compliance in 0.0f64..1.0f64) {
        let source = r#"
package prop.threshold
constitution "cdd01ef066bc6cf2"
default deny

allow {
    compliance >= 0.5
}
"#;
        let rule = parse_rule(source).map_err(|err| {
            proptest::test_runner::TestCaseError::fail(err.to_string())
        })?;
        let mut attributes = Map::new();
        attributes.insert("compliance".to_string(), json!(compliance));
        let outcome = evaluate_rule(&rule, &attributes);
        if compliance >= 0.5 {
            prop_assert_eq!(outcome.winning_clause, Some(0));
        } else {
            prop_assert_eq!(outcome.winning_clause, None);
        }
    }

    /// Evaluation against arbitrary attribute maps never reports a fired
    /// clause whose trace status is not definitively true.
    #[test]
    fn fired_clauses_are_definitively_true(
        keys in prop::collection::vec("[a-z]{1,8}", 0..6),
        numbers in prop::collection::vec(any::<f64>(), 0..6),
    ) {
        let source = r#"
package prop.soundness
constitution "cdd01ef066bc6cf2"
default require_review

allow {
    compliance >= 0.9
    risk == "low"
}
"#;
        let rule = parse_rule(source).map_err(|err| {
            proptest::test_runner::TestCaseError::fail(err.to_string())
        })?;
        let mut attributes = Map::new();
        for (key, number) in keys.iter().zip(numbers.iter()) {
            if number.is_finite() {
                attributes.insert(key.clone(), Value::from(*number));
            }
        }
        let outcome = evaluate_rule(&rule, &attributes);
        if let Some(index) = outcome.winning_clause {
            let clause = outcome
                .trace
                .iter()
                .find(|entry| entry.clause_index == index);
            prop_assert!(clause.is_some_and(|entry| entry.status == Truth::True));
        }
    }
}
